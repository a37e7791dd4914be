//! Presence lookups against Microsoft Graph.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const PRESENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Activity values reported by Graph. Anything unrecognised is `Unknown`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresenceState {
    Available,
    Busy,
    InACall,
    InAConferenceCall,
    InAMeeting,
    DoNotDisturb,
    Away,
    BeRightBack,
    Inactive,
    Offline,
    OffWork,
    OutOfOffice,
    Presenting,
    UrgentInterruptionsOnly,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PresenceState::Available => "Available",
            PresenceState::Busy => "Busy",
            PresenceState::InACall => "In a call",
            PresenceState::InAConferenceCall => "In a conference call",
            PresenceState::InAMeeting => "In a meeting",
            PresenceState::DoNotDisturb => "Do not disturb",
            PresenceState::Away => "Away",
            PresenceState::BeRightBack => "Be right back",
            PresenceState::Inactive => "Inactive",
            PresenceState::Offline => "Offline",
            PresenceState::OffWork => "Off work",
            PresenceState::OutOfOffice => "Out of office",
            PresenceState::Presenting => "Presenting",
            PresenceState::UrgentInterruptionsOnly => "Urgent interruptions only",
            PresenceState::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("presence request was not authorized (401)")]
    ReauthRequired,
    #[error("presence endpoint not found (404): {0}")]
    BadEndpoint(String),
    #[error("presence request timed out")]
    Timeout,
    #[error("presence request failed: {0}")]
    Other(String),
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::BadEndpoint(_))
    }

    fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

pub trait PresenceSource {
    fn fetch(&self, token: &str) -> Result<PresenceState, FetchError>;
}

#[derive(Deserialize, Debug)]
struct PresenceResponse {
    #[serde(default)]
    availability: Option<String>,
    #[serde(default)]
    activity: Option<PresenceState>,
}

pub struct GraphPresence {
    client: Client,
    endpoint: String,
}

impl GraphPresence {
    pub fn new(client: Client, graph_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: graph_endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl PresenceSource for GraphPresence {
    fn fetch(&self, token: &str) -> Result<PresenceState, FetchError> {
        let url = format!("{}/me/presence", self.endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .timeout(PRESENCE_TIMEOUT)
            .send()
            .map_err(FetchError::from_request)?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(FetchError::ReauthRequired),
            StatusCode::NOT_FOUND => return Err(FetchError::BadEndpoint(url)),
            status if !status.is_success() => {
                return Err(FetchError::Other(format!("unexpected status {status}")))
            }
            _ => {}
        }
        let body: PresenceResponse = response.json().map_err(FetchError::from_request)?;
        debug!(
            availability = body.availability.as_deref().unwrap_or("-"),
            activity = ?body.activity,
            "presence fetched"
        );
        Ok(body.activity.unwrap_or_default())
    }
}
