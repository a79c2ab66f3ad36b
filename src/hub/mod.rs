//! Endpoint hub: one [`RegistryClient`] per configured registry endpoint.
//!
//! The same host is often referred to as both `http://host` and
//! `https://host`. Lookups therefore try the `http://` form first and the
//! `https://` form second, so either spelling resolves to the one client built
//! for that host.

mod normalize;
pub use normalize::*;

#[cfg(test)]
mod normalize_test;

//---
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::client::FingerprintFetcher;
use crate::client::HarborFetcher;
use crate::client::RegistryClient;
use crate::EndpointConfig;
use crate::HubError;
use crate::Result;
use crate::WatchConfig;

/// Fixed map from endpoint to client, built once from configuration
pub struct EndpointHub {
    clients: HashMap<String, Arc<RegistryClient>>,
    token: CancellationToken,
}

impl std::fmt::Debug for EndpointHub {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EndpointHub")
            .field("endpoints", &self.list())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl EndpointHub {
    /// Builds a hub whose clients query Harbor over HTTP.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        endpoints: &[EndpointConfig],
        config: WatchConfig,
        parent: &CancellationToken,
    ) -> Result<Self> {
        let timeout = config.fetch_timeout();
        Self::with_fetchers(endpoints, config, parent, |endpoint| {
            Ok(Arc::new(HarborFetcher::new(endpoint, timeout)?) as Arc<dyn FingerprintFetcher>)
        })
    }

    /// Builds a hub taking each endpoint's fetcher from `make_fetcher`.
    ///
    /// Fails on a host listed twice, whatever scheme each entry uses.
    pub fn with_fetchers<F>(
        endpoints: &[EndpointConfig],
        config: WatchConfig,
        parent: &CancellationToken,
        mut make_fetcher: F,
    ) -> Result<Self>
    where
        F: FnMut(&EndpointConfig) -> Result<Arc<dyn FingerprintFetcher>>,
    {
        let mut hosts = HashSet::with_capacity(endpoints.len());
        let mut keys = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let key = endpoint_key(&endpoint.url)?;
            if !hosts.insert(canonical_endpoint(&endpoint.url)?) {
                return Err(HubError::DuplicateEndpoint(endpoint.url.clone()).into());
            }
            keys.push(key);
        }

        let token = parent.child_token();
        let mut clients = HashMap::with_capacity(endpoints.len());
        for (endpoint, key) in endpoints.iter().zip(keys) {
            let fetcher = match make_fetcher(endpoint) {
                Ok(fetcher) => fetcher,
                Err(e) => {
                    // Stop the reapers of the clients built so far
                    token.cancel();
                    return Err(e);
                }
            };
            let client = RegistryClient::new(key.clone(), fetcher, &token, config.clone());
            debug!(endpoint = %key, "Registry client created");
            clients.insert(key, Arc::new(client));
        }

        info!(endpoints = clients.len(), "Endpoint hub ready");
        Ok(Self { clients, token })
    }

    /// Endpoints the hub was built with
    pub fn list(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.clients.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// Finds the client for `url`, trying its `http://` then its `https://` form
    pub fn resolve(
        &self,
        url: &str,
    ) -> Result<Arc<RegistryClient>> {
        [to_http(url), to_https(url)]
            .iter()
            .find_map(|candidate| self.clients.get(candidate))
            .cloned()
            .ok_or_else(|| HubError::NotFound(url.to_string()).into())
    }

    /// Cancels every client's watchers and waits for their tasks to finish
    pub async fn shutdown(&self) {
        self.token.cancel();
        join_all(self.clients.values().map(|c| c.shutdown())).await;
        info!("Endpoint hub stopped");
    }
}
