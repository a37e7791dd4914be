//! First-run setup: asks for the identity and Govee settings and picks
//! the light to drive.

use std::io::{self, BufRead, Write};

use reqwest::blocking::Client;
use thiserror::Error;

use crate::config::{DeviceSection, Endpoints, FileConfig, IdentitySection};
use crate::light::{list_devices, DeviceRecord, LightError};
use crate::schedule::WorkSchedule;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("devices could not be read: {0}")]
    Devices(#[from] LightError),
    #[error("no devices are registered to this API key")]
    NoDevices,
    #[error("input ended before setup completed")]
    Eof,
}

/// Produces a configuration when none exists yet.
pub trait SetupProvider {
    fn run_setup(&mut self) -> Result<FileConfig, SetupError>;
}

pub trait DeviceDirectory {
    fn devices(&self, api_key: &str) -> Result<Vec<DeviceRecord>, LightError>;
}

pub struct GoveeDirectory {
    client: Client,
    endpoint: String,
}

impl GoveeDirectory {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

impl DeviceDirectory for GoveeDirectory {
    fn devices(&self, api_key: &str) -> Result<Vec<DeviceRecord>, LightError> {
        list_devices(&self.client, &self.endpoint, api_key)
    }
}

/// Interactive wizard over any line-based input and output.
pub struct ConsoleSetup<R, W, D> {
    input: R,
    output: W,
    directory: D,
}

impl<R: BufRead, W: Write, D: DeviceDirectory> ConsoleSetup<R, W, D> {
    pub fn new(input: R, output: W, directory: D) -> Self {
        Self {
            input,
            output,
            directory,
        }
    }

    fn ask(&mut self, question: &str) -> Result<String, SetupError> {
        loop {
            write!(self.output, "{question}")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(SetupError::Eof);
            }
            let answer = line.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
        }
    }

    fn choose_device(&mut self, devices: &[DeviceRecord]) -> Result<DeviceRecord, SetupError> {
        for (index, device) in devices.iter().enumerate() {
            writeln!(
                self.output,
                "[{}] {}, {}",
                index + 1,
                device.device_name,
                device.device
            )?;
        }
        loop {
            let answer = self.ask("Please enter the number of the light you wish to use: ")?;
            let picked = answer
                .parse::<usize>()
                .ok()
                .and_then(|number| number.checked_sub(1))
                .and_then(|index| devices.get(index));
            match picked {
                Some(device) => return Ok(device.clone()),
                None => writeln!(self.output, "Please select a valid number.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write, D: DeviceDirectory> SetupProvider for ConsoleSetup<R, W, D> {
    fn run_setup(&mut self) -> Result<FileConfig, SetupError> {
        writeln!(self.output, "No configuration found, starting setup.")?;
        let tenant_id = self.ask("Please enter your Azure tenant id: ")?;
        let client_id = self.ask("Please enter your Azure client id (or application ID): ")?;
        let api_key = self.ask("Please enter your Govee API key: ")?;

        writeln!(self.output, "Reading devices...")?;
        let devices = self.directory.devices(&api_key)?;
        if devices.is_empty() {
            return Err(SetupError::NoDevices);
        }
        let device = self.choose_device(&devices)?;
        writeln!(self.output, "Selected {}", device.device_name)?;

        Ok(FileConfig {
            identity: IdentitySection {
                tenant_id,
                client_id,
            },
            device: DeviceSection {
                device_id: device.device,
                model: device.model,
                api_key,
                selected_light: device.device_name,
            },
            schedule: WorkSchedule::default(),
            endpoints: Endpoints::default(),
        })
    }
}
