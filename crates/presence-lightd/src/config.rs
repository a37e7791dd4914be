//! Persisted settings (`config.toml`) and the immutable runtime
//! [`Configuration`] built from them plus the command line.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::schedule::WorkSchedule;

const APP_DIR: &str = "presence-lightd";
const CONFIG_FILE: &str = "config.toml";
const TOKEN_CACHE_FILE: &str = "token_cache.json";

pub const DEFAULT_POLL_SECS: u64 = 15;
pub const MIN_POLL_SECS: u64 = 10;
pub const DEFAULT_BRIGHTNESS: u8 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine config directory")]
    NoConfigDir,
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config field `{0}` is empty")]
    Missing(&'static str),
}

/// Where the config file and token cache live on disk.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    dir: PathBuf,
}

impl ConfigPaths {
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let dir = match override_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(APP_DIR),
        };
        Ok(Self { dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn token_cache(&self) -> PathBuf {
        self.dir.join(TOKEN_CACHE_FILE)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IdentitySection {
    pub tenant_id: String,
    pub client_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceSection {
    pub device_id: String,
    pub model: String,
    pub api_key: String,
    pub selected_light: String,
}

/// Remote endpoints. Only overridden when pointing at a test double.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub authority: String,
    pub graph: String,
    pub govee: String,
    pub reachability_host: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            graph: "https://graph.microsoft.com/v1.0".to_string(),
            govee: "https://developer-api.govee.com/v1".to_string(),
            reachability_host: "www.google.com:80".to_string(),
        }
    }
}

/// Contents of `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub identity: IdentitySection,
    pub device: DeviceSection,
    #[serde(default)]
    pub schedule: WorkSchedule,
    #[serde(default, skip_serializing_if = "is_default_endpoints")]
    pub endpoints: Endpoints,
}

fn is_default_endpoints(endpoints: &Endpoints) -> bool {
    *endpoints == Endpoints::default()
}

impl FileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("identity.tenant_id", &self.identity.tenant_id),
            ("identity.client_id", &self.identity.client_id),
            ("device.device_id", &self.device.device_id),
            ("device.model", &self.device.model),
            ("device.api_key", &self.device.api_key),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}

/// Returns `Ok(None)` when no config has been written yet.
pub fn load_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(Some(config))
}

pub fn save_config(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    write_atomically(path, text.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes through a temp file in the target directory and renames it into
/// place. The file ends up readable by the owner only.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Options that come from the command line rather than the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub poll_interval: Duration,
    pub brightness: u8,
    pub after_work: bool,
    pub include_weekends: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            brightness: DEFAULT_BRIGHTNESS,
            after_work: false,
            include_weekends: false,
        }
    }
}

/// Everything the daemon needs to run. Never mutated after startup.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub identity: IdentitySection,
    pub device: DeviceSection,
    pub schedule: WorkSchedule,
    pub endpoints: Endpoints,
    pub poll_interval: Duration,
    pub brightness: u8,
    pub after_work: bool,
    pub include_weekends: bool,
}

impl Configuration {
    pub fn new(file: FileConfig, options: RunOptions) -> Self {
        Self {
            identity: file.identity,
            device: file.device,
            schedule: file.schedule,
            endpoints: file.endpoints,
            poll_interval: options.poll_interval,
            brightness: options.brightness,
            after_work: options.after_work,
            include_weekends: options.include_weekends,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_file_config() -> FileConfig {
    FileConfig {
        identity: IdentitySection {
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
        },
        device: DeviceSection {
            device_id: "AA:BB:CC:DD:EE:FF:00:11".to_string(),
            model: "H6159".to_string(),
            api_key: "govee-key".to_string(),
            selected_light: "Desk strip".to_string(),
        },
        schedule: WorkSchedule::default(),
        endpoints: Endpoints::default(),
    }
}
