use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config file failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config file failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),
    #[error("either a config file or a url is required")]
    MissingUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOption {
    pub url: String,
    #[serde(default = "loglevel_default")]
    pub log_level: String,
    #[serde(default = "history_limit_default")]
    pub history_limit: usize,
    #[serde(default)]
    pub ride_id: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectOpts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectOpts {
    #[serde(default = "reconnect_enabled_default")]
    pub enabled: bool,
    #[serde(default = "max_attempts_default")]
    pub max_attempts: usize,
    #[serde(default = "initial_delay_default")]
    pub initial_delay_ms: u64,
}

impl Default for ReconnectOpts {
    fn default() -> Self {
        ReconnectOpts {
            enabled: reconnect_enabled_default(),
            max_attempts: max_attempts_default(),
            initial_delay_ms: initial_delay_default(),
        }
    }
}

impl TrackerOption {
    pub fn new(url: &str) -> Self {
        TrackerOption {
            url: url.to_string(),
            log_level: loglevel_default(),
            history_limit: history_limit_default(),
            ride_id: None,
            reconnect: ReconnectOpts::default(),
        }
    }

    /// Parses a config document. Call [`TrackerOption::validate`] once overrides are applied.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn loglevel_default() -> String {
    String::from("info")
}

fn history_limit_default() -> usize {
    100
}

fn reconnect_enabled_default() -> bool {
    true
}

fn max_attempts_default() -> usize {
    5
}

fn initial_delay_default() -> u64 {
    500
}
