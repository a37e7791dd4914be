//! Microsoft identity platform sign-in: cached tokens, silent renewal via
//! the refresh-token grant, and the device-code flow as a last resort.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{write_atomically, Configuration};
use crate::shutdown::{Sleeper, Wake};

const SCOPES: &str = "User.Read Presence.Read offline_access openid profile";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const PROFILE_TIMEOUT: Duration = Duration::from_secs(5);
const EXPIRY_SKEW_SECS: i64 = 60;
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity request timed out")]
    Timeout,
    #[error("not authorized (401), sign-in has to be renewed")]
    Unauthorized,
    #[error("endpoint not found (404): {0}")]
    BadEndpoint(String),
    #[error("device code sign-in failed: {0}")]
    DeviceFlow(String),
    #[error("device code expired before sign-in completed")]
    Expired,
    #[error("sign-in interrupted")]
    Interrupted,
    #[error("identity request failed: {0}")]
    Request(String),
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::BadEndpoint(_))
    }

    fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::Request(err.to_string())
        }
    }
}

/// Mutable per-run sign-in state handed to the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub display_name: String,
}

pub trait IdentityProvider {
    /// Returns a session with a usable access token, signing in if needed.
    fn authorize(&mut self, sleeper: &dyn Sleeper) -> Result<Session, AuthError>;

    /// Forgets the current access token after the API rejected it.
    fn invalidate(&mut self);
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_poll_interval() -> u64 {
    5
}

/// Shows the user where to sign in.
pub trait DeviceCodePrompt {
    fn show(&self, code: &DeviceCode);
}

pub struct TerminalPrompt;

impl DeviceCodePrompt for TerminalPrompt {
    fn show(&self, code: &DeviceCode) {
        match &code.message {
            Some(message) => println!("{message}"),
            None => println!(
                "To sign in, open {} and enter the code {}",
                code.verification_uri, code.user_code
            ),
        }
    }
}

/// On-disk token cache, keyed by tenant and client id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenCache {
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub account_name: Option<String>,
}

impl TokenCache {
    pub fn empty(tenant_id: &str, client_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            account_name: None,
        }
    }

    fn belongs_to(&self, tenant_id: &str, client_id: &str) -> bool {
        self.tenant_id == tenant_id && self.client_id == client_id
    }

    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let expires_at = self.expires_at?;
        if expires_at <= now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) {
            return None;
        }
        self.access_token.as_deref()
    }
}

/// Reads and writes the token cache file. Writes only happen when the
/// serialized cache differs from what is on disk.
pub struct TokenStore {
    path: PathBuf,
    on_disk: Option<String>,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            on_disk: None,
        }
    }

    pub fn load(&mut self) -> Option<TokenCache> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unable to read token cache");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(cache) => {
                self.on_disk = Some(text);
                Some(cache)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring corrupt token cache");
                None
            }
        }
    }

    /// Returns `true` when the file was rewritten.
    pub fn persist(&mut self, cache: &TokenCache) -> io::Result<bool> {
        let text = serde_json::to_string_pretty(cache).map_err(io::Error::other)?;
        if self.on_disk.as_deref() == Some(text.as_str()) {
            return Ok(false);
        }
        write_atomically(&self.path, text.as_bytes())?;
        self.on_disk = Some(text);
        Ok(true)
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthErrorBody {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

enum Grant {
    Tokens(TokenResponse),
    Refused(OAuthErrorBody),
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    surname: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl Profile {
    fn full_name(&self) -> Option<String> {
        let joined = [self.given_name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.trim().is_empty() {
            self.display_name.clone().filter(|name| !name.is_empty())
        } else {
            Some(joined.trim().to_string())
        }
    }
}

#[derive(Deserialize, Debug)]
struct IdTokenClaims {
    #[serde(default)]
    name: Option<String>,
}

/// Reads the `name` claim from an id token without verifying it; the
/// value is only used for display.
pub fn id_token_name(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes).ok()?;
    claims.name.filter(|name| !name.is_empty())
}

pub struct IdentityClient {
    client: Client,
    authority: String,
    graph: String,
    tenant_id: String,
    client_id: String,
    store: TokenStore,
    cache: TokenCache,
    prompt: Box<dyn DeviceCodePrompt>,
}

impl IdentityClient {
    pub fn new(
        client: Client,
        config: &Configuration,
        mut store: TokenStore,
        prompt: Box<dyn DeviceCodePrompt>,
    ) -> Self {
        let tenant_id = config.identity.tenant_id.clone();
        let client_id = config.identity.client_id.clone();
        let cache = match store.load() {
            Some(cache) if cache.belongs_to(&tenant_id, &client_id) => cache,
            Some(_) => {
                info!("token cache belongs to another application, starting fresh");
                TokenCache::empty(&tenant_id, &client_id)
            }
            None => TokenCache::empty(&tenant_id, &client_id),
        };
        Self {
            client,
            authority: config.endpoints.authority.trim_end_matches('/').to_string(),
            graph: config.endpoints.graph.trim_end_matches('/').to_string(),
            tenant_id,
            client_id,
            store,
            cache,
            prompt,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    fn oauth_url(&self, leaf: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority, self.tenant_id, leaf)
    }

    fn post_form(&self, url: &str, pairs: &[(&str, &str)]) -> Result<Response, AuthError> {
        self.client
            .post(url)
            .form(pairs)
            .send()
            .map_err(AuthError::from_request)
    }

    fn post_token(&self, pairs: &[(&str, &str)]) -> Result<Grant, AuthError> {
        let url = self.oauth_url("token");
        let response = self.post_form(&url, pairs)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AuthError::BadEndpoint(url));
        }
        if status.is_success() {
            let tokens = response.json().map_err(AuthError::from_request)?;
            return Ok(Grant::Tokens(tokens));
        }
        match response.json::<OAuthErrorBody>() {
            Ok(body) => Ok(Grant::Refused(body)),
            Err(_) => Err(AuthError::Request(format!("token endpoint returned {status}"))),
        }
    }

    fn store_tokens(&mut self, tokens: TokenResponse) -> Result<String, AuthError> {
        let lifetime = tokens.expires_in;
        let expires_at = TimeDelta::try_seconds(lifetime)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .ok_or_else(|| AuthError::Request(format!("token lifetime out of range: {lifetime}")))?;
        let access_token = tokens.access_token;
        self.cache.access_token = Some(access_token.clone());
        if tokens.refresh_token.is_some() {
            self.cache.refresh_token = tokens.refresh_token;
        }
        self.cache.expires_at = Some(expires_at);
        if let Some(name) = tokens.id_token.as_deref().and_then(id_token_name) {
            self.cache.account_name = Some(name);
        }
        Ok(access_token)
    }

    fn acquire_token(&mut self, sleeper: &dyn Sleeper) -> Result<String, AuthError> {
        if let Some(token) = self.cache.valid_access_token(Utc::now()) {
            debug!("using cached access token");
            return Ok(token.to_string());
        }
        if let Some(refresh_token) = self.cache.refresh_token.clone() {
            let client_id = self.client_id.clone();
            let grant = self.post_token(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("scope", SCOPES),
            ])?;
            match grant {
                Grant::Tokens(tokens) => {
                    info!("access token renewed silently");
                    return self.store_tokens(tokens);
                }
                Grant::Refused(body) => {
                    warn!(
                        reason = %body.describe(),
                        "token renewal refused, starting device code sign-in"
                    );
                    self.cache.access_token = None;
                    self.cache.refresh_token = None;
                    self.cache.expires_at = None;
                }
            }
        }
        self.device_code_flow(sleeper)
    }

    fn device_code_flow(&mut self, sleeper: &dyn Sleeper) -> Result<String, AuthError> {
        let url = self.oauth_url("devicecode");
        let pairs = [("client_id", self.client_id.as_str()), ("scope", SCOPES)];
        let response = self.post_form(&url, &pairs)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AuthError::BadEndpoint(url));
        }
        if !status.is_success() {
            let reason = response
                .json::<OAuthErrorBody>()
                .map(|body| body.describe())
                .unwrap_or_else(|_| format!("device code request returned {status}"));
            return Err(AuthError::DeviceFlow(reason));
        }
        let code: DeviceCode = response.json().map_err(AuthError::from_request)?;
        self.prompt.show(&code);

        let lifetime = code.expires_in;
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(lifetime))
            .ok_or_else(|| {
                AuthError::Request(format!("device code lifetime out of range: {lifetime}"))
            })?;
        let mut interval = Duration::from_secs(code.interval);
        let client_id = self.client_id.clone();
        loop {
            if sleeper.sleep(interval) == Wake::Interrupted {
                return Err(AuthError::Interrupted);
            }
            if Instant::now() >= deadline {
                return Err(AuthError::Expired);
            }
            let grant = self.post_token(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", client_id.as_str()),
                ("device_code", code.device_code.as_str()),
            ])?;
            match grant {
                Grant::Tokens(tokens) => {
                    info!("device code sign-in completed");
                    return self.store_tokens(tokens);
                }
                Grant::Refused(body) => match body.error.as_str() {
                    "authorization_pending" => debug!("waiting for device code sign-in"),
                    "slow_down" => interval += SLOW_DOWN_STEP,
                    "expired_token" => return Err(AuthError::Expired),
                    _ => return Err(AuthError::DeviceFlow(body.describe())),
                },
            }
        }
    }

    fn fallback_name(&self) -> String {
        self.cache
            .account_name
            .clone()
            .unwrap_or_else(|| "unknown user".to_string())
    }

    fn resolve_display_name(&mut self, access_token: &str) -> Result<String, AuthError> {
        let url = format!("{}/me", self.graph);
        let response = match self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .timeout(PROFILE_TIMEOUT)
            .send()
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Err(AuthError::Timeout),
            Err(err) => {
                warn!(error = %err, "profile lookup failed, using token claims");
                return Ok(self.fallback_name());
            }
        };
        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.invalidate();
                Err(AuthError::Unauthorized)
            }
            StatusCode::NOT_FOUND => Err(AuthError::BadEndpoint(url)),
            status if status.is_success() => match response.json::<Profile>() {
                Ok(profile) => Ok(profile.full_name().unwrap_or_else(|| self.fallback_name())),
                Err(err) => {
                    warn!(error = %err, "unreadable profile, using token claims");
                    Ok(self.fallback_name())
                }
            },
            status => {
                warn!(%status, "profile lookup rejected, using token claims");
                Ok(self.fallback_name())
            }
        }
    }

    fn save_cache(&mut self) {
        match self.store.persist(&self.cache) {
            Ok(true) => debug!("token cache written"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "unable to write token cache"),
        }
    }
}

impl IdentityProvider for IdentityClient {
    fn authorize(&mut self, sleeper: &dyn Sleeper) -> Result<Session, AuthError> {
        info!("starting authentication");
        let acquired = self.acquire_token(sleeper);
        let result = acquired.and_then(|access_token| {
            let display_name = self.resolve_display_name(&access_token)?;
            self.cache.account_name = Some(display_name.clone());
            Ok(Session {
                access_token,
                display_name,
            })
        });
        self.save_cache();
        result
    }

    fn invalidate(&mut self) {
        self.cache.access_token = None;
        self.cache.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{sample_file_config, Configuration, RunOptions};
    use crate::testing::{http_client, MockServer, NoWait};
    use serde_json::json;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct RecordingPrompt(Rc<RefCell<Vec<String>>>);

    impl DeviceCodePrompt for RecordingPrompt {
        fn show(&self, code: &DeviceCode) {
            self.0.borrow_mut().push(code.user_code.clone());
        }
    }

    fn config_for(server: &MockServer) -> Configuration {
        let mut file = sample_file_config();
        file.endpoints.authority = server.url().to_string();
        file.endpoints.graph = server.url().to_string();
        Configuration::new(file, RunOptions::default())
    }

    fn id_token(name: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"name":"{name}"}}"#));
        format!("eyJhbGciOiJub25lIn0.{payload}.sig")
    }

    fn write_cache(path: &Path, cache: &TokenCache) {
        fs::write(path, serde_json::to_string(cache).unwrap()).unwrap();
    }

    fn cached(access_valid: bool) -> TokenCache {
        let mut cache = TokenCache::empty("tenant-1", "client-1");
        cache.access_token = Some("cached-access".to_string());
        cache.refresh_token = Some("cached-refresh".to_string());
        cache.expires_at = Some(if access_valid {
            Utc::now() + chrono::Duration::hours(1)
        } else {
            Utc::now() - chrono::Duration::minutes(5)
        });
        cache
    }

    fn client_for(server: &MockServer, dir: &TempDir) -> (IdentityClient, RecordingPrompt) {
        let prompt = RecordingPrompt::default();
        let store = TokenStore::new(dir.path().join("token_cache.json"));
        let client = IdentityClient::new(
            http_client(),
            &config_for(server),
            store,
            Box::new(prompt.clone()),
        );
        (client, prompt)
    }

    const PROFILE: &str = r#"{"givenName":"Ada","surname":"Lovelace","displayName":"Ada L."}"#;

    #[test]
    fn cached_token_is_used_without_sign_in() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir.path().join("token_cache.json"), &cached(true));
        let server = MockServer::start(vec![(200, PROFILE.to_string())]);
        let (mut client, prompt) = client_for(&server, &dir);

        let session = client.authorize(&NoWait).unwrap();
        assert_eq!(session.access_token, "cached-access");
        assert_eq!(session.display_name, "Ada Lovelace");
        assert!(prompt.0.borrow().is_empty());

        let requests = server.finish();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/me");
        assert_eq!(
            requests[0].header("Authorization"),
            Some("Bearer cached-access")
        );
    }

    #[test]
    fn expired_token_is_renewed_with_refresh_token() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir.path().join("token_cache.json"), &cached(false));
        let tokens = json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "expires_in": 3600,
        });
        let server = MockServer::start(vec![
            (200, tokens.to_string()),
            (200, PROFILE.to_string()),
        ]);
        let (mut client, prompt) = client_for(&server, &dir);

        let session = client.authorize(&NoWait).unwrap();
        assert_eq!(session.access_token, "fresh-access");
        assert!(prompt.0.borrow().is_empty());

        let requests = server.finish();
        assert_eq!(requests[0].path, "/tenant-1/oauth2/v2.0/token");
        assert!(requests[0].body.contains("grant_type=refresh_token"));
        assert!(requests[0].body.contains("refresh_token=cached-refresh"));

        let on_disk: TokenCache = serde_json::from_str(
            &fs::read_to_string(dir.path().join("token_cache.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk.refresh_token.as_deref(), Some("fresh-refresh"));
        assert_eq!(on_disk.account_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn empty_cache_runs_device_code_flow() {
        let dir = TempDir::new().unwrap();
        let device_code = json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 0,
            "message": "Sign in",
        });
        let pending = r#"{"error":"authorization_pending"}"#;
        let tokens = json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "expires_in": 3600,
            "id_token": id_token("Grace Hopper"),
        });
        let server = MockServer::start(vec![
            (200, device_code.to_string()),
            (400, pending.to_string()),
            (200, tokens.to_string()),
            (500, "{}".to_string()),
        ]);
        let (mut client, prompt) = client_for(&server, &dir);

        let session = client.authorize(&NoWait).unwrap();
        assert_eq!(session.access_token, "new-access");
        // Profile lookup failed, so the id token name is used.
        assert_eq!(session.display_name, "Grace Hopper");
        assert_eq!(*prompt.0.borrow(), vec!["ABCD-EFGH".to_string()]);

        let requests = server.finish();
        let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/tenant-1/oauth2/v2.0/devicecode",
                "/tenant-1/oauth2/v2.0/token",
                "/tenant-1/oauth2/v2.0/token",
                "/me",
            ]
        );
        assert_eq!(
            requests[0].header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert!(requests[0].body.contains("scope=User.Read+Presence.Read"));
        assert!(requests[1]
            .body
            .contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
        assert!(requests[1].body.contains("device_code=dev-123"));
        assert!(dir.path().join("token_cache.json").exists());
    }

    #[test]
    fn declined_device_code_fails_the_attempt() {
        let dir = TempDir::new().unwrap();
        let device_code = json!({
            "device_code": "d",
            "user_code": "U",
            "verification_uri": "https://x",
            "expires_in": 900,
            "interval": 0,
        });
        let server = MockServer::start(vec![
            (200, device_code.to_string()),
            (400, r#"{"error":"authorization_declined"}"#.to_string()),
        ]);
        let (mut client, _prompt) = client_for(&server, &dir);

        let err = client.authorize(&NoWait).unwrap_err();
        assert!(matches!(err, AuthError::DeviceFlow(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn out_of_range_token_lifetime_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir.path().join("token_cache.json"), &cached(false));
        let tokens = json!({"access_token": "a", "expires_in": i64::MAX});
        let server = MockServer::start(vec![(200, tokens.to_string())]);
        let (mut client, _prompt) = client_for(&server, &dir);

        let err = client.authorize(&NoWait).unwrap_err();
        assert!(matches!(err, AuthError::Request(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn out_of_range_device_code_lifetime_is_an_error() {
        let dir = TempDir::new().unwrap();
        let device_code = json!({
            "device_code": "d",
            "user_code": "U",
            "verification_uri": "https://x",
            "expires_in": u64::MAX,
            "interval": 0,
        });
        let server = MockServer::start(vec![(200, device_code.to_string())]);
        let (mut client, _prompt) = client_for(&server, &dir);

        let err = client.authorize(&NoWait).unwrap_err();
        assert!(matches!(err, AuthError::Request(_)));
    }

    #[test]
    fn profile_not_found_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir.path().join("token_cache.json"), &cached(true));
        let server = MockServer::start(vec![(404, "{}".to_string())]);
        let (mut client, _prompt) = client_for(&server, &dir);

        let err = client.authorize(&NoWait).unwrap_err();
        assert!(matches!(err, AuthError::BadEndpoint(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn profile_unauthorized_drops_the_access_token() {
        let dir = TempDir::new().unwrap();
        write_cache(&dir.path().join("token_cache.json"), &cached(true));
        let server = MockServer::start(vec![(401, "{}".to_string())]);
        let (mut client, _prompt) = client_for(&server, &dir);

        let err = client.authorize(&NoWait).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
        assert!(client.cache().access_token.is_none());
        assert_eq!(
            client.cache().refresh_token.as_deref(),
            Some("cached-refresh")
        );
    }

    #[test]
    fn cache_for_other_application_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut foreign = cached(true);
        foreign.client_id = "someone-else".to_string();
        write_cache(&dir.path().join("token_cache.json"), &foreign);
        let server = MockServer::start(vec![]);
        let (client, _prompt) = client_for(&server, &dir);

        assert!(client.cache().access_token.is_none());
        assert_eq!(client.cache().client_id, "client-1");
    }

    #[test]
    fn store_rewrites_only_on_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("token_cache.json");
        let mut store = TokenStore::new(path.clone());
        let mut cache = TokenCache::empty("t", "c");

        assert!(store.persist(&cache).unwrap());
        assert!(!store.persist(&cache).unwrap());
        cache.account_name = Some("Ada".to_string());
        assert!(store.persist(&cache).unwrap());

        let mut reloaded = TokenStore::new(path);
        assert_eq!(reloaded.load(), Some(cache.clone()));
        assert!(!reloaded.persist(&cache).unwrap());
    }

    #[test]
    fn corrupt_cache_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token_cache.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(TokenStore::new(path).load(), None);
    }

    #[test]
    fn access_token_near_expiry_is_not_reused() {
        let mut cache = TokenCache::empty("t", "c");
        cache.access_token = Some("a".to_string());
        let now = Utc::now();
        cache.expires_at = Some(now + chrono::Duration::seconds(30));
        assert_eq!(cache.valid_access_token(now), None);
        cache.expires_at = Some(now + chrono::Duration::minutes(10));
        assert_eq!(cache.valid_access_token(now), Some("a"));
    }

    #[test]
    fn id_token_name_reads_the_payload() {
        assert_eq!(
            id_token_name(&id_token("Grace Hopper")).as_deref(),
            Some("Grace Hopper")
        );
        assert_eq!(id_token_name("garbage"), None);
    }
}
