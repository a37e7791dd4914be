//! The poll loop: authorize, check the schedule, fetch presence, drive the
//! light, sleep, repeat. Every wait goes through the [`Sleeper`] so a
//! shutdown signal ends the loop promptly, and every way out of the loop
//! turns the light off exactly once.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Configuration;
use crate::error::Fatal;
use crate::identity::{AuthError, IdentityProvider, Session};
use crate::light::{self, LightCommand, LightControl};
use crate::network::Reachability;
use crate::presence::{FetchError, PresenceSource};
use crate::schedule::{self, Clock, ScheduleDecision, SuppressReason};
use crate::shutdown::{Sleeper, Wake};

pub const SUPPRESSED_RECHECK: Duration = Duration::from_secs(30);
pub const OFFLINE_RECHECK: Duration = Duration::from_secs(30);
pub const FALLBACK_WAIT: Duration = Duration::from_secs(15);
pub const AUTH_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const MAX_AUTH_RETRIES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Starting,
    Authorizing,
    Polling,
    Suppressed(SuppressReason),
    ShuttingDown,
}

enum Next {
    Wait(Duration),
    Immediately,
    Stop,
}

pub struct Poller<'a> {
    config: &'a Configuration,
    identity: &'a mut dyn IdentityProvider,
    presence: &'a dyn PresenceSource,
    light: &'a dyn LightControl,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    probe: &'a dyn Reachability,
    state: State,
    unauthorized_streak: u32,
}

impl<'a> Poller<'a> {
    pub fn new(
        config: &'a Configuration,
        identity: &'a mut dyn IdentityProvider,
        presence: &'a dyn PresenceSource,
        light: &'a dyn LightControl,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
        probe: &'a dyn Reachability,
    ) -> Self {
        Self {
            config,
            identity,
            presence,
            light,
            clock,
            sleeper,
            probe,
            state: State::Starting,
            unauthorized_streak: 0,
        }
    }

    /// Runs until a shutdown signal (`Ok`) or a fatal condition (`Err`).
    /// Either way the light is switched off before returning.
    pub fn run(&mut self) -> Result<(), Fatal> {
        let result = self.run_until_stopped();
        self.enter(State::ShuttingDown);
        match &result {
            Ok(()) => info!("shutdown requested, switching the light off"),
            Err(fatal) => error!(error = %fatal, "stopping"),
        }
        self.actuate(&LightCommand::Off);
        result
    }

    fn run_until_stopped(&mut self) -> Result<(), Fatal> {
        if !self.probe.is_reachable() {
            return Err(Fatal::NoNetwork);
        }
        let Some(mut session) = self.authorize()? else {
            return Ok(());
        };
        info!(user = %session.display_name, "signed in");

        loop {
            let wait = match self.cycle(&mut session)? {
                Next::Wait(wait) => wait,
                // Still goes through the sleeper so a pending signal is seen.
                Next::Immediately => Duration::ZERO,
                Next::Stop => return Ok(()),
            };
            if self.sleeper.sleep(wait) == Wake::Interrupted {
                return Ok(());
            }
        }
    }

    fn cycle(&mut self, session: &mut Session) -> Result<Next, Fatal> {
        if let ScheduleDecision::Suppressed(reason) =
            schedule::evaluate(self.clock.now(), self.config)
        {
            if self.state != State::Suppressed(reason) {
                info!(%reason, "outside the working schedule, light stays off");
            }
            self.enter(State::Suppressed(reason));
            self.actuate(&LightCommand::Off);
            return Ok(Next::Wait(SUPPRESSED_RECHECK));
        }
        self.enter(State::Polling);

        if !self.probe.is_reachable() {
            warn!("no network connection, waiting for reconnect");
            return Ok(Next::Wait(OFFLINE_RECHECK));
        }

        match self.presence.fetch(&session.access_token) {
            Ok(presence) => {
                self.unauthorized_streak = 0;
                let command = light::command_for(presence, self.config.brightness);
                info!(
                    %presence,
                    user = %session.display_name,
                    light = %self.config.device.selected_light,
                    brightness = self.config.brightness,
                    "presence fetched"
                );
                self.actuate(&command);
                Ok(Next::Wait(self.config.poll_interval))
            }
            Err(FetchError::ReauthRequired) => {
                self.unauthorized_streak += 1;
                warn!(
                    streak = self.unauthorized_streak,
                    "presence request was not authorized, signing in again"
                );
                self.identity.invalidate();
                let Some(renewed) = self.authorize()? else {
                    return Ok(Next::Stop);
                };
                *session = renewed;
                self.enter(State::Polling);
                // Only the first rejection after a good fetch retries at once.
                if self.unauthorized_streak > 1 {
                    return Ok(Next::Wait(FALLBACK_WAIT));
                }
                Ok(Next::Immediately)
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                warn!(error = %err, retry_in = ?FALLBACK_WAIT, "presence request failed");
                Ok(Next::Wait(FALLBACK_WAIT))
            }
        }
    }

    /// `Ok(None)` means shutdown was requested while signing in.
    fn authorize(&mut self) -> Result<Option<Session>, Fatal> {
        self.enter(State::Authorizing);
        let mut retries = 0;
        loop {
            match self.identity.authorize(self.sleeper) {
                Ok(session) => return Ok(Some(session)),
                Err(AuthError::Interrupted) => return Ok(None),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    retries += 1;
                    if retries > MAX_AUTH_RETRIES {
                        return Err(Fatal::Misconfigured(format!(
                            "cannot authorize after {MAX_AUTH_RETRIES} retries: {err}"
                        )));
                    }
                    warn!(
                        error = %err,
                        attempt = retries,
                        max = MAX_AUTH_RETRIES,
                        retry_in = ?AUTH_RETRY_DELAY,
                        "authorization failed"
                    );
                    if self.sleeper.sleep(AUTH_RETRY_DELAY) == Wake::Interrupted {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn actuate(&self, command: &LightCommand) {
        if let Err(err) = self.light.apply(command) {
            warn!(error = %err, ?command, "light command failed");
        }
    }

    fn enter(&mut self, state: State) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state change");
            self.state = state;
        }
    }
}
