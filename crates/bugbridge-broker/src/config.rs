use std::{env, path::PathBuf, time::Duration};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use url::Url;

use bugbridge_core::TrackerConfig;

const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_CREDENTIALS_DIR: &str = "./credentials";
const DEFAULT_RATE_LIMIT_MAX: usize = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Everything the broker needs at startup, resolved from the environment.
pub struct BrokerConfig {
    pub tracker: TrackerConfig,
    /// HMAC key material for sealing OAuth state blobs.
    pub state_key: Vec<u8>,
    pub credentials_dir: PathBuf,
    /// Where the browser lands after a completed authorization.
    pub app_base_url: String,
    /// Entitled owners; `None` admits everyone.
    pub entitled_owners: Option<Vec<String>>,
    pub host: String,
    pub port: u16,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = TrackerConfig::default();

        let client_id = require_env("TRACKER_CLIENT_ID")?;
        let client_secret = require_env("TRACKER_CLIENT_SECRET")?;
        let redirect_uri = require_env("TRACKER_REDIRECT_URI")?;

        let auth_url = env_or("TRACKER_AUTH_URL", &defaults.auth_url);
        let token_url = env_or("TRACKER_TOKEN_URL", &defaults.token_url);
        let api_base = env_or("TRACKER_API_BASE", &defaults.api_base);
        for (label, value) in [
            ("TRACKER_AUTH_URL", &auth_url),
            ("TRACKER_TOKEN_URL", &token_url),
            ("TRACKER_API_BASE", &api_base),
            ("TRACKER_REDIRECT_URI", &redirect_uri),
        ] {
            Url::parse(value).map_err(|_| {
                ConfigError::InvalidConfig(format!("{label} is not a valid URL: `{value}`"))
            })?;
        }

        let scopes = match env::var("TRACKER_SCOPES") {
            Ok(raw) if !raw.trim().is_empty() => parse_list(&raw),
            _ => defaults.scopes.clone(),
        };
        let audience = env::var("TRACKER_AUDIENCE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or(defaults.audience.clone());
        let http_timeout = env::var("TRACKER_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(defaults.http_timeout);

        let tracker = TrackerConfig {
            client_id,
            client_secret,
            auth_url,
            token_url,
            api_base,
            redirect_uri,
            scopes,
            audience,
            http_timeout,
        };

        let state_key = read_state_key()?;

        let credentials_dir = PathBuf::from(env_or("CREDENTIALS_DIR", DEFAULT_CREDENTIALS_DIR));
        let app_base_url = env_or("APP_BASE_URL", DEFAULT_APP_BASE_URL);

        let entitled_owners = env::var("TRACKER_ENTITLED_OWNERS")
            .ok()
            .map(|raw| parse_list(&raw))
            .filter(|owners| !owners.is_empty());

        let host = env_or("BROKER_HOST", "0.0.0.0");
        let port = env::var("BROKER_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let rate_limit_max = env::var("RATE_LIMIT_MAX")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX);
        let rate_limit_window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);

        Ok(Self {
            tracker,
            state_key,
            credentials_dir,
            app_base_url,
            entitled_owners,
            host,
            port,
            rate_limit_max,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs.max(1)),
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name)),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .collect()
}

fn read_state_key() -> Result<Vec<u8>, ConfigError> {
    if let Ok(b64) = env::var("STATE_KEY_B64")
        && !b64.trim().is_empty()
    {
        return BASE64_STANDARD
            .decode(b64.trim().as_bytes())
            .map_err(|err| ConfigError::InvalidConfig(format!("STATE_KEY_B64: {err}")));
    }
    match env::var("STATE_KEY") {
        Ok(raw) if !raw.is_empty() => Ok(raw.into_bytes()),
        _ => Err(ConfigError::MissingEnv("STATE_KEY_B64")),
    }
}
