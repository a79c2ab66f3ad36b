//! Poll-to-watch bridge for registry tags
//!
//! Registries only answer point-in-time queries. This module turns those
//! queries into level-triggered watch streams:
//!
//! ```text
//! ┌──────────────────┐  get_or_create   ┌───────────────┐  subscribe  ┌─────────────┐
//! │ WatcherRegistry  │ ───────────────► │ EntityWatcher │ ──────────► │ EventStream │
//! │  (one per client)│ ◄─────────────── │  poll loop    │             │ (bounded)   │
//! └──────────────────┘  RemovalNotice   └───────────────┘             └─────────────┘
//!          │ reaper                            │ publish
//!          ▼                                   ▼
//!   shutdown stale watchers             Broadcaster fan-out
//! ```
//!
//! - One [`EntityWatcher`] per [`EntityKey`] and registry, shared by all subscribers
//! - Per-subscriber queues are bounded; a full queue drops events for that subscriber only
//! - A watcher whose fetch fails reports itself for removal; the next `watch` call
//!   for the same key gets a fresh watcher
//! - Cancelling the registry token tears every watcher down

mod broadcaster;
mod registry;
mod types;
mod watcher;

#[cfg(test)]
mod registry_test;

pub use broadcaster::*;
pub use registry::*;
pub use types::*;
pub use watcher::EntityWatcher;
pub use watcher::WatcherId;
pub use watcher::WatcherState;
