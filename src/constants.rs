// -
// Watch defaults

/// Pending events a single subscriber may hold
pub(crate) const MAX_QUEUED_EVENTS: usize = 1000;

/// Capacity of the removal channel shared by a registry's watchers
pub(crate) const MAX_REMOVAL_NOTICES: usize = 1000;

pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 1000;
pub(crate) const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

// -
// Harbor API

/// Single tag detail, relative to the endpoint url: project/repository, tag
pub(crate) const TAG_DETAIL_PATH: &str = "api/repositories";

// -
// Endpoint schemes

pub(crate) const HTTP_PREFIX: &str = "http://";
pub(crate) const HTTPS_PREFIX: &str = "https://";

/// Prefix of every environment override, e.g. `TAGWATCH__WATCH__POLL_INTERVAL_MS`
pub(crate) const ENV_PREFIX: &str = "TAGWATCH";
