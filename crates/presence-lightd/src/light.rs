//! Govee light control: the presence to color table and the device API.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::presence::PresenceState;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "Govee-API-Key";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
pub const YELLOW: Rgb = Rgb {
    r: 255,
    g: 165,
    b: 0,
};
pub const PINK: Rgb = Rgb {
    r: 153,
    g: 0,
    b: 153,
};
pub const BLUE: Rgb = Rgb {
    r: 0,
    g: 153,
    b: 255,
};

const COLOR_TABLE: &[(PresenceState, Rgb)] = &[
    (PresenceState::Available, GREEN),
    (PresenceState::Busy, RED),
    (PresenceState::InACall, RED),
    (PresenceState::InAConferenceCall, RED),
    (PresenceState::InAMeeting, RED),
    (PresenceState::DoNotDisturb, RED),
    (PresenceState::Presenting, RED),
    (PresenceState::UrgentInterruptionsOnly, RED),
    (PresenceState::Away, YELLOW),
    (PresenceState::BeRightBack, YELLOW),
    (PresenceState::Inactive, YELLOW),
    (PresenceState::Offline, PINK),
    (PresenceState::OffWork, PINK),
    (PresenceState::OutOfOffice, PINK),
];

pub fn color_for(state: PresenceState) -> Rgb {
    COLOR_TABLE
        .iter()
        .find(|(known, _)| *known == state)
        .map(|(_, color)| *color)
        .unwrap_or(BLUE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightCommand {
    Color { color: Rgb, brightness: u8 },
    Off,
}

pub fn command_for(state: PresenceState, brightness: u8) -> LightCommand {
    LightCommand::Color {
        color: color_for(state),
        brightness: brightness.min(100),
    }
}

#[derive(Debug, Error)]
pub enum LightError {
    #[error("`{command}` command was rejected with status {status}")]
    Rejected { command: &'static str, status: u16 },
    #[error("`{command}` command failed: {source}")]
    Request {
        command: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("device list request failed: {0}")]
    DeviceList(String),
}

pub trait LightControl {
    fn apply(&self, command: &LightCommand) -> Result<(), LightError>;
}

#[derive(Serialize, Debug)]
struct ControlRequest<'a> {
    device: &'a str,
    model: &'a str,
    cmd: ControlCommand<'a>,
}

#[derive(Serialize, Debug)]
struct ControlCommand<'a> {
    name: &'a str,
    value: Value,
}

/// A single Govee device addressed through the developer API.
pub struct GoveeLight {
    client: Client,
    endpoint: String,
    api_key: String,
    device: String,
    model: String,
}

impl GoveeLight {
    pub fn new(client: Client, endpoint: &str, api_key: &str, device: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            device: device.to_string(),
            model: model.to_string(),
        }
    }

    fn send_command(&self, name: &'static str, value: Value) -> Result<(), LightError> {
        let payload = ControlRequest {
            device: &self.device,
            model: &self.model,
            cmd: ControlCommand { name, value },
        };
        let response = self
            .client
            .put(format!("{}/devices/control", self.endpoint))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(CONTROL_TIMEOUT)
            .json(&payload)
            .send()
            .map_err(|source| LightError::Request {
                command: name,
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LightError::Rejected {
                command: name,
                status: status.as_u16(),
            });
        }
        debug!(command = name, "light command accepted");
        Ok(())
    }
}

impl LightControl for GoveeLight {
    fn apply(&self, command: &LightCommand) -> Result<(), LightError> {
        match command {
            LightCommand::Off => self.send_command("turn", json!("off")),
            LightCommand::Color { color, brightness } => {
                self.send_command("color", json!(color))?;
                self.send_command("brightness", json!(brightness))
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device: String,
    pub model: String,
    pub device_name: String,
}

#[derive(Deserialize, Debug)]
struct DeviceListResponse {
    data: DeviceListData,
}

#[derive(Deserialize, Debug)]
struct DeviceListData {
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Lists the devices registered to `api_key`.
pub fn list_devices(
    client: &Client,
    endpoint: &str,
    api_key: &str,
) -> Result<Vec<DeviceRecord>, LightError> {
    let response: DeviceListResponse = client
        .get(format!("{}/devices", endpoint.trim_end_matches('/')))
        .header(API_KEY_HEADER, api_key)
        .send()
        .and_then(|res| res.error_for_status())
        .and_then(|res| res.json())
        .map_err(|err| LightError::DeviceList(err.to_string()))?;
    Ok(response.data.devices)
}
