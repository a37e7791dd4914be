use std::process::ExitCode;

use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::AuthError;
use crate::presence::FetchError;
use crate::setup::SetupError;

/// Conditions that end the process with a documented exit code.
#[derive(Debug, Error)]
pub enum Fatal {
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("no network connection, connect to the internet and restart")]
    NoNetwork,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Misconfigured(String),
}

impl Fatal {
    pub fn exit_code(&self) -> u8 {
        match self {
            Fatal::Setup(_) => 2,
            Fatal::NoNetwork => 3,
            Fatal::InvalidArgument(_) => 4,
            Fatal::Misconfigured(_) => 5,
        }
    }
}

impl From<&Fatal> for ExitCode {
    fn from(fatal: &Fatal) -> Self {
        ExitCode::from(fatal.exit_code())
    }
}

impl From<ConfigError> for Fatal {
    fn from(err: ConfigError) -> Self {
        Fatal::Setup(err.to_string())
    }
}

impl From<SetupError> for Fatal {
    fn from(err: SetupError) -> Self {
        Fatal::Setup(err.to_string())
    }
}

impl From<AuthError> for Fatal {
    fn from(err: AuthError) -> Self {
        Fatal::Misconfigured(err.to_string())
    }
}

impl From<FetchError> for Fatal {
    fn from(err: FetchError) -> Self {
        Fatal::Misconfigured(err.to_string())
    }
}
