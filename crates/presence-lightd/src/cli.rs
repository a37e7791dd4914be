use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;

use crate::config::{RunOptions, DEFAULT_BRIGHTNESS, DEFAULT_POLL_SECS, MIN_POLL_SECS};

#[derive(Parser, Debug)]
#[command(
    name = "presence-lightd",
    version,
    about = "Shows Microsoft Teams presence on a Govee light"
)]
pub struct Cli {
    /// Seconds between presence checks (at least 10)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(MIN_POLL_SECS..))]
    pub refresh: Option<u64>,
    /// Keep following presence after working hours
    #[arg(long, visible_alias = "aw")]
    pub afterwork: bool,
    /// Also follow presence on weekends
    #[arg(short, long)]
    pub weekend: bool,
    /// Light brightness in percent (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub brightness: Option<u8>,
    /// Directory holding config.toml and the token cache
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            poll_interval: Duration::from_secs(self.refresh.unwrap_or(DEFAULT_POLL_SECS)),
            brightness: self.brightness.unwrap_or(DEFAULT_BRIGHTNESS),
            after_work: self.afterwork,
            include_weekends: self.weekend,
        }
    }
}

/// `--help` and `--version` surface as clap errors but are not failures.
pub fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}
