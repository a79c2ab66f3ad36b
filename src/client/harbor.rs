use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::FingerprintFetcher;
use crate::constants::TAG_DETAIL_PATH;
use crate::watch::TagCoordinates;
use crate::EndpointConfig;
use crate::FetchError;
use crate::Result;

/// Subset of Harbor's tag detail document the watcher needs
#[derive(Debug, Deserialize)]
pub struct TagDetail {
    #[serde(default)]
    pub digest: String,

    #[serde(default)]
    pub name: String,
}

/// Queries `GET {endpoint}/api/repositories/{project}/{repository}/tags/{tag}`
/// and uses the returned digest as fingerprint.
///
/// No retries and no login: credentials are sent as basic auth on every request.
pub struct HarborFetcher {
    endpoint: String,
    username: String,
    password: String,
    client: Client,
}

impl std::fmt::Debug for HarborFetcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("HarborFetcher")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HarborFetcher {
    /// Builds a fetcher for `endpoint` whose requests give up after `request_timeout`
    pub fn new(
        endpoint: &EndpointConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: endpoint.url.clone(),
                source,
            })?;

        Ok(Self {
            endpoint: endpoint.url.trim_end_matches('/').to_string(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// e.g. `http://harbor.domain.com/api/repositories/helix-saga/go-all/tags/latest`
    pub fn tag_url(
        &self,
        coordinates: &TagCoordinates,
    ) -> String {
        format!(
            "{}/{}/{}/tags/{}",
            self.endpoint,
            TAG_DETAIL_PATH,
            coordinates.image_name(),
            coordinates.tag
        )
    }

    pub async fn tag_detail(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<TagDetail> {
        let url = self.tag_url(coordinates);
        debug!(method = "GET", url = %url, "registry request");

        let mut request = self.client.get(&url);
        if !self.username.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            }
            .into());
        }

        response.json::<TagDetail>().await.map_err(|e| {
            FetchError::Decode {
                url,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl FingerprintFetcher for HarborFetcher {
    async fn fetch_fingerprint(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<String> {
        let detail = self.tag_detail(coordinates).await?;
        if detail.digest.is_empty() {
            return Err(FetchError::Decode {
                url: self.tag_url(coordinates),
                reason: "tag detail carries no digest".to_string(),
            }
            .into());
        }
        Ok(detail.digest)
    }
}
