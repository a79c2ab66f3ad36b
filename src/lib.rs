//! Push-based watch streams over poll-only registry tag metadata.
//!
//! ```text
//! EndpointHub::resolve(url) ─► RegistryClient::watch(coords) ─► WatcherRegistry
//!                                                                  └─► EntityWatcher ─► EventStream
//! ```

mod client;
mod config;
mod constants;
mod errors;
mod hub;
pub mod metrics;
mod utils;
pub mod watch;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use hub::*;
pub use watch::*;
