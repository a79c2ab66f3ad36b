//! Registry clients
//!
//! - [`FingerprintFetcher`] - point-in-time query the watch core polls
//! - [`HarborFetcher`] - HTTP implementation against Harbor's tag detail endpoint
//! - [`RegistryClient`] - one endpoint: its fetcher plus the registry of watchers polling it
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use tagwatch::{EndpointConfig, HarborFetcher, RegistryClient, TagCoordinates, WatchConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = WatchConfig::default();
//!     let endpoint = EndpointConfig::new("http://harbor.domain.com", "admin", "pwd");
//!     let fetcher = HarborFetcher::new(&endpoint, config.fetch_timeout()).unwrap();
//!
//!     let token = CancellationToken::new();
//!     let client = RegistryClient::new(&endpoint.url, Arc::new(fetcher), &token, config);
//!
//!     let mut events = client
//!         .watch(&TagCoordinates::new("helix-saga", "go-all", "latest"))
//!         .unwrap();
//!     while let Some(event) = events.next().await {
//!         println!("{:?}: {:?}", event.kind, event.target.fingerprint);
//!     }
//! }
//! ```

mod harbor;
mod registry_client;

pub use harbor::*;
pub use registry_client::*;

#[cfg(test)]
mod harbor_test;

//---
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::watch::TagCoordinates;
use crate::Result;

/// Point-in-time lookup of a tag's content fingerprint (e.g. its digest).
///
/// Any error, whether not-found, auth or transport, makes the polling
/// watcher report itself for removal.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FingerprintFetcher: Send + Sync + 'static {
    async fn fetch_fingerprint(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<String>;
}
