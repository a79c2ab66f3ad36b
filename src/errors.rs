//! Tag Watch Error Hierarchy
//!
//! Defines the error types of the poll-to-watch bridge, grouped by the layer
//! that raises them: the fetch collaborator, the watcher core, the endpoint
//! hub and configuration loading.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures of the remote metadata fetch
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Watcher and registry lifecycle failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Endpoint resolution failures
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Configuration source or parsing failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that parsed but do not make sense
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport level failure (connect, TLS, body read)
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with something other than 200
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Response body did not carry a usable fingerprint
    #[error("Failed to decode tag detail from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The fetch did not complete in time
    #[error("Fetch of {key} timed out after {duration:?}")]
    Timeout { key: String, duration: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Entity could not be resolved upstream; drives removal, never surfaced to watchers
    #[error("Fetch failed for {key}: {reason}")]
    FetchFailed { key: String, reason: String },

    /// Operation attempted after the owning scope was cancelled
    #[error("Shutdown in progress")]
    ShutdownInProgress,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// No configured endpoint matches either scheme form of the url
    #[error("Endpoint {0} was not configured")]
    NotFound(String),

    /// Endpoint url is empty or lacks a host part
    #[error("Invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    /// Same host configured twice, possibly under different schemes
    #[error("Endpoint {0} is configured more than once")]
    DuplicateEndpoint(String),
}

impl Error {
    /// Whether the error is an endpoint lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Hub(HubError::NotFound(_)))
    }
}
