//! Configuration loading for the tag watcher.
//!
//! Sources are merged with increasing priority:
//! 1. Default values (hardcoded)
//! 2. `config/tagwatch.toml` (optional)
//! 3. File named by the `CONFIG_PATH` environment variable
//! 4. Explicit override path passed to [`Settings::load`]
//! 5. Environment variables, e.g. `TAGWATCH__WATCH__POLL_INTERVAL_MS=250` (highest priority)

mod endpoint;
mod watch;
pub use endpoint::*;
pub use watch::*;


//---
use std::collections::HashSet;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::ENV_PREFIX;
use crate::hub::canonical_endpoint;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Polling, queueing and teardown parameters
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging setup of the binary
    #[serde(default)]
    pub log: LogConfig,

    /// Registry endpoints the hub is built from
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    /// Tags watched by the binary at startup
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Settings {
    /// Loads and validates settings from every source.
    ///
    /// # Arguments
    /// * `override_path` - Optional file that must exist; overrides all files before it
    pub fn load(override_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder()
            .add_source(File::with_name("config/tagwatch").required(false));

        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path));
        }

        if let Some(path) = override_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.watch.validate()?;

        let mut endpoints = HashSet::new();
        for endpoint in &self.endpoints {
            let canonical = canonical_endpoint(&endpoint.url)?;
            if !endpoints.insert(canonical) {
                return Err(Error::ConfigInvalid(format!(
                    "endpoint {} is configured more than once",
                    endpoint.url
                )));
            }
        }

        for target in &self.targets {
            if target.project.is_empty() || target.repository.is_empty() || target.tag.is_empty() {
                return Err(Error::ConfigInvalid(format!(
                    "target {}/{}:{} has an empty coordinate",
                    target.project, target.repository, target.tag
                )));
            }
            let canonical = canonical_endpoint(&target.endpoint)?;
            if !endpoints.contains(&canonical) {
                return Err(Error::ConfigInvalid(format!(
                    "target {} refers to unknown endpoint {}",
                    target.coordinates().key(),
                    target.endpoint
                )));
            }
        }
        Ok(())
    }
}
