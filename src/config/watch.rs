use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_FETCH_TIMEOUT_MS;
use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::constants::DEFAULT_REMOVAL_TIMEOUT_MS;
use crate::constants::MAX_QUEUED_EVENTS;
use crate::constants::MAX_REMOVAL_NOTICES;
use crate::Error;
use crate::Result;

/// Tuning of the polling loop, the per-subscriber queues and the reaper channel
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Tick period of the polling loop; a slow fetch does not push later ticks back
    /// Default: 500ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of the random delay added after every tick.
    /// Spreads out watchers that poll the same registry. 0 disables jitter.
    #[serde(default)]
    pub max_jitter_ms: u64,

    /// Single fetch timeout; an elapsed fetch counts as a failure
    /// Default: 10s
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Bounded wait when reporting a failing watcher to the reaper
    /// Default: 1s
    #[serde(default = "default_removal_timeout_ms")]
    pub removal_timeout_ms: u64,

    /// Pending events each subscriber may hold before new ones are dropped
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,

    /// Capacity of the watcher -> reaper removal channel
    #[serde(default = "default_removal_channel_size")]
    pub removal_channel_size: usize,

    /// Publish a final `Deleted` event before a reaped watcher closes its streams
    #[serde(default = "default_emit_terminal_event")]
    pub emit_terminal_event: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_jitter_ms: 0,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            removal_timeout_ms: default_removal_timeout_ms(),
            subscriber_buffer_size: default_subscriber_buffer_size(),
            removal_channel_size: default_removal_channel_size(),
            emit_terminal_event: default_emit_terminal_event(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigInvalid("watch.poll_interval_ms must be > 0".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::ConfigInvalid("watch.fetch_timeout_ms must be > 0".into()));
        }
        if self.removal_timeout_ms == 0 {
            return Err(Error::ConfigInvalid("watch.removal_timeout_ms must be > 0".into()));
        }
        if self.subscriber_buffer_size == 0 {
            return Err(Error::ConfigInvalid(
                "watch.subscriber_buffer_size must be > 0".into(),
            ));
        }
        if self.removal_channel_size == 0 {
            return Err(Error::ConfigInvalid(
                "watch.removal_channel_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn removal_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_timeout_ms)
    }

    /// Period of the poll ticker
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Extra delay in `[0, max_jitter_ms]` applied after each tick
    pub fn poll_jitter(&self) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=self.max_jitter_ms))
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}
fn default_removal_timeout_ms() -> u64 {
    DEFAULT_REMOVAL_TIMEOUT_MS
}
fn default_subscriber_buffer_size() -> usize {
    MAX_QUEUED_EVENTS
}
fn default_removal_channel_size() -> usize {
    MAX_REMOVAL_NOTICES
}
fn default_emit_terminal_event() -> bool {
    true
}
