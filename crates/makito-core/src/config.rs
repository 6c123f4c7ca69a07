use std::time::Duration;

use thiserror::Error;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no host configured")]
    NoHost,
    #[error("poll interval {0}s outside 1..=60")]
    IntervalOutOfRange(u64),
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub polling: bool,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub cadence: SchedulerCadence,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            username: "admin".to_string(),
            password: String::new(),
            polling: true,
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            cadence: SchedulerCadence::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::NoHost);
        }
        if self.poll_interval < MIN_POLL_INTERVAL || self.poll_interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::IntervalOutOfRange(self.poll_interval.as_secs()));
        }
        Ok(())
    }

    /// The device only serves TLS on 443; every other port is plain HTTP.
    pub fn use_https(&self) -> bool {
        self.port == 443
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_https() { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host.trim(), self.port)
    }
}

/// Tick multiples at which the slower sub-resources are refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerCadence {
    pub thumbnails_every: u64,
    pub streams_every: u64,
    pub presets_every: u64,
    pub preview_every: u64,
    pub choices_every: u64,
}

impl Default for SchedulerCadence {
    fn default() -> Self {
        Self {
            thumbnails_every: 3,
            streams_every: 3,
            presets_every: 5,
            preview_every: 10,
            choices_every: 20,
        }
    }
}
