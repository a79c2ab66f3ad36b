use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::watch::TagCoordinates;

/// One registry endpoint together with the credentials used to query it
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base url, e.g. `https://harbor.domain.com`
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

impl EndpointConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A tag the binary watches from startup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Endpoint url, matched scheme-insensitively against `endpoints`
    pub endpoint: String,
    pub project: String,
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

impl TargetConfig {
    pub fn coordinates(&self) -> TagCoordinates {
        TagCoordinates::new(&self.project, &self.repository, &self.tag)
    }
}

fn default_tag() -> String {
    "latest".to_string()
}
