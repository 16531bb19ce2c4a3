//! Runtime configuration.
//!
//! Settings come from a JSON file named by `LIVE_SYNC_CONFIG`, then
//! individual `LIVE_SYNC_*` variables override single fields. A `.env` file
//! is honoured by the binary through `dotenvy`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::poller::PollerSettings;
use crate::service::SortPolicy;

/// Default service name the Twitch client is registered under.
pub const DEFAULT_SERVICE: &str = "twitch.tv";

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_api_base_url() -> String {
    platforms_api::twitch::DEFAULT_BASE_URL.to_string()
}

fn default_event_capacity() -> usize {
    256
}

/// Synchronizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub service: String,
    /// Time between the starts of two polls of one channel.
    pub poll_interval_ms: u64,
    /// Bound on a single fetch. Must be non-zero.
    pub fetch_timeout_ms: u64,
    pub sort_policy: SortPolicy,
    pub api_base_url: String,
    /// Sent as `Client-ID`. Empty omits the header.
    pub client_id: String,
    /// Capacity of the channel event broadcast.
    pub event_capacity: usize,
    /// Channels to add at startup, as names or URLs.
    pub channels: Vec<String>,
    /// Import the channels this user follows at startup.
    pub follow_user: Option<String>,
    /// Quality labels reported for every channel that goes live. Empty
    /// leaves qualities unresolved.
    pub qualities: Vec<String>,
    /// Enables file logging into this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            sort_policy: SortPolicy::default(),
            api_base_url: default_api_base_url(),
            client_id: String::new(),
            event_capacity: default_event_capacity(),
            channels: Vec::new(),
            follow_user: None,
            qualities: Vec::new(),
            log_dir: None,
        }
    }
}

impl SyncConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = match var("LIVE_SYNC_CONFIG") {
            Some(path) => Self::from_file(&path)
                .map_err(|e| Error::config(format!("Failed to load {}: {}", path, e)))?,
            None => Self::default(),
        };

        if let Some(service) = var("LIVE_SYNC_SERVICE") {
            config.service = service;
        }
        if let Some(value) = var("LIVE_SYNC_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse_number("LIVE_SYNC_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = var("LIVE_SYNC_FETCH_TIMEOUT_MS") {
            config.fetch_timeout_ms = parse_number("LIVE_SYNC_FETCH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("LIVE_SYNC_SORT_POLICY") {
            config.sort_policy = value.parse()?;
        }
        if let Some(url) = var("LIVE_SYNC_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(client_id) = var("LIVE_SYNC_CLIENT_ID") {
            config.client_id = client_id;
        }
        if let Some(value) = var("LIVE_SYNC_EVENT_CAPACITY") {
            config.event_capacity = parse_number("LIVE_SYNC_EVENT_CAPACITY", &value)?;
        }
        if let Some(list) = var("LIVE_SYNC_CHANNELS") {
            config.channels = split_list(&list);
        }
        if let Some(list) = var("LIVE_SYNC_QUALITIES") {
            config.qualities = split_list(&list);
        }
        if let Some(user) = var("LIVE_SYNC_FOLLOW_USER") {
            config.follow_user = Some(user);
        }
        if let Some(dir) = var("LIVE_SYNC_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(Error::config("service must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity must be greater than zero"));
        }
        self.poller_settings().validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings::new(self.poll_interval(), self.fetch_timeout())
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("Invalid {}: {}", key, e)))
}
