mod cli;
mod config;
mod error;
mod identity;
mod light;
mod logging;
mod network;
mod poller;
mod presence;
mod schedule;
mod setup;
mod shutdown;
#[cfg(test)]
mod testing;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::{load_config, save_config, ConfigPaths, Configuration, Endpoints};
use crate::error::Fatal;
use crate::identity::{IdentityClient, TerminalPrompt, TokenStore};
use crate::light::GoveeLight;
use crate::network::TcpProbe;
use crate::poller::Poller;
use crate::presence::GraphPresence;
use crate::schedule::LocalClock;
use crate::setup::{ConsoleSetup, GoveeDirectory, SetupProvider};
use crate::shutdown::ShutdownSignal;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> ExitCode {
    let cli = match Cli::parse_from_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) if cli::is_informational(&err) => {
            err.print().ok();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            err.print().ok();
            return ExitCode::from(&Fatal::InvalidArgument(err.kind().to_string()));
        }
    };
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(()) => {
            info!("stopped");
            ExitCode::SUCCESS
        }
        Err(fatal) => {
            error!(error = %fatal, code = fatal.exit_code(), "exiting");
            ExitCode::from(&fatal)
        }
    }
}

fn run(cli: &Cli) -> Result<(), Fatal> {
    let paths = ConfigPaths::resolve(cli.config_dir.clone())?;
    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| Fatal::Setup(format!("unable to build HTTP client: {err}")))?;

    let config_file = paths.config_file();
    let file = match load_config(&config_file)? {
        Some(file) => file,
        None => {
            let directory = GoveeDirectory::new(client.clone(), &Endpoints::default().govee);
            let file =
                ConsoleSetup::new(io::stdin().lock(), io::stdout(), directory).run_setup()?;
            save_config(&config_file, &file)?;
            info!(path = %config_file.display(), "configuration saved");
            file
        }
    };
    let config = Configuration::new(file, cli.run_options());
    info!(
        light = %config.device.selected_light,
        refresh = ?config.poll_interval,
        brightness = config.brightness,
        after_work = config.after_work,
        weekends = config.include_weekends,
        "starting"
    );

    let shutdown = ShutdownSignal::install()
        .map_err(|err| Fatal::Setup(format!("unable to install signal handler: {err}")))?;
    let mut identity = IdentityClient::new(
        client.clone(),
        &config,
        TokenStore::new(paths.token_cache()),
        Box::new(TerminalPrompt),
    );
    let presence = GraphPresence::new(client.clone(), &config.endpoints.graph);
    let light = GoveeLight::new(
        client,
        &config.endpoints.govee,
        &config.device.api_key,
        &config.device.device_id,
        &config.device.model,
    );
    let probe = TcpProbe::new(config.endpoints.reachability_host.clone());

    Poller::new(
        &config,
        &mut identity,
        &presence,
        &light,
        &LocalClock,
        &shutdown,
        &probe,
    )
    .run()
}
