use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::FingerprintFetcher;
use crate::watch::EventStream;
use crate::watch::TagCoordinates;
use crate::watch::WatcherRegistry;
use crate::Result;
use crate::WatchConfig;

/// One registry endpoint: the fetcher that queries it and the watchers polling it
pub struct RegistryClient {
    endpoint: String,
    fetcher: Arc<dyn FingerprintFetcher>,
    watchers: WatcherRegistry,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("endpoint", &self.endpoint)
            .field("watchers", &self.watchers)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    /// Must be called inside a tokio runtime, the watcher registry spawns its reaper here
    pub fn new(
        endpoint: impl Into<String>,
        fetcher: Arc<dyn FingerprintFetcher>,
        parent: &CancellationToken,
        config: WatchConfig,
    ) -> Self {
        let watchers = WatcherRegistry::new(parent, Arc::clone(&fetcher), config);
        Self {
            endpoint: endpoint.into(),
            fetcher,
            watchers,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn watchers(&self) -> &WatcherRegistry {
        &self.watchers
    }

    /// One-off query, bypassing the watchers
    pub async fn fetch_fingerprint(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<String> {
        self.fetcher.fetch_fingerprint(coordinates).await
    }

    /// Subscribes to change events of one tag, sharing the poll loop with other subscribers
    pub fn watch(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<EventStream> {
        self.watchers.watch(coordinates)
    }

    pub async fn shutdown(&self) {
        self.watchers.shutdown().await;
    }
}
