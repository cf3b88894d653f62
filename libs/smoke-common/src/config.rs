// Runtime configuration shared by the runner and the HTTP catalog

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://godbolt.org";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
#[error("invalid value '{value}' for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub max_concurrency: usize,
    /// Deadline for a whole matrix run; `None` means no deadline
    pub run_timeout_seconds: Option<u64>,
    pub request_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            run_timeout_seconds: None,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Read `SMOKE_API_URL`, `SMOKE_MAX_CONCURRENCY`, `SMOKE_RUN_TIMEOUT_SECS`
    /// and `SMOKE_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("SMOKE_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("SMOKE_MAX_CONCURRENCY") {
            config.max_concurrency = parse_positive("SMOKE_MAX_CONCURRENCY", &raw)? as usize;
        }
        if let Some(raw) = lookup("SMOKE_RUN_TIMEOUT_SECS") {
            config.run_timeout_seconds = Some(parse_positive("SMOKE_RUN_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = lookup("SMOKE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_seconds = parse_positive("SMOKE_REQUEST_TIMEOUT_SECS", &raw)?;
        }

        Ok(config)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError {
            key,
            value: raw.to_string(),
        }),
    }
}
