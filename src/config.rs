use crate::error::AppError;

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_millis(3_000);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: Option<String>,
    /// `None` when credentials are absent; only outbound calls need them
    pub twilio: Option<TwilioConfig>,
    pub public_base_url: Option<String>,
    pub max_retries: u32,
    pub session_ttl: Duration,
    pub reaper_interval: Duration,
    pub persistence_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            twilio: None,
            public_base_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
            session_ttl: DEFAULT_SESSION_TTL,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let twilio = match (get("TWILIO_ACCOUNT_SID"), get("TWILIO_AUTH_TOKEN")) {
            (Some(account_sid), Some(auth_token)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                phone_number: get("TWILIO_PHONE_NUMBER"),
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: get("DATABASE_URL"),
            twilio,
            public_base_url: get("PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", defaults.max_retries)?,
            session_ttl: Duration::from_secs(parse_or(
                get("SESSION_TTL_SECS"),
                "SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            reaper_interval: Duration::from_secs(parse_or(
                get("REAPER_INTERVAL_SECS"),
                "REAPER_INTERVAL_SECS",
                defaults.reaper_interval.as_secs(),
            )?),
            persistence_timeout: Duration::from_millis(parse_or(
                get("PERSISTENCE_TIMEOUT_MS"),
                "PERSISTENCE_TIMEOUT_MS",
                defaults.persistence_timeout.as_millis() as u64,
            )?),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value '{v}'"))),
        None => Ok(default),
    }
}
