//! Polling loop bridging one tag to a push-based event stream.
//!
//! ```text
//! tick(interval) + jitter ─► fetch_fingerprint ─┬─ changed   ─► publish Modified
//!          ▲                                     ├─ unchanged ─► (nothing)
//!          │                                     └─ error     ─► send RemovalNotice (bounded wait)
//!          └─────────────────────────────────────────────┘
//! ```
//!
//! Ticks come at a fixed rate: a fetch slower than the interval delays the
//! next tick instead of stacking missed ones. The loop exits on cancellation
//! of the watcher token. Once a removal notice has been accepted by the reaper
//! the watcher stops polling and only waits to be torn down. A watcher shut
//! down from outside tells its registry on exit so the entry is pruned.
//! With `emit_terminal_event` set, the teardown publishes a last `Deleted`
//! event before the subscriber streams close.

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::interval_at;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Broadcaster;
use super::ChangeEvent;
use super::EntityKey;
use super::EventStream;
use super::TagCoordinates;
use super::WatchTarget;
use crate::client::FingerprintFetcher;
use crate::metrics::FETCH_FAILURES;
use crate::utils::async_task::spawn_tracked;
use crate::FetchError;
use crate::Result;
use crate::WatchConfig;
use crate::WatchError;

/// Process-unique id distinguishing successive watchers of the same key
pub type WatcherId = u64;

/// Sent by a failing watcher to ask its registry for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemovalNotice {
    pub(crate) key: EntityKey,
    pub(crate) watcher_id: WatcherId,
}

/// Lifecycle of an [`EntityWatcher`]; `Shutdown` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherState {
    Running = 0,
    ShuttingDown = 1,
    Shutdown = 2,
}

impl From<u8> for WatcherState {
    fn from(v: u8) -> Self {
        match v {
            0 => WatcherState::Running,
            1 => WatcherState::ShuttingDown,
            _ => WatcherState::Shutdown,
        }
    }
}

/// Collaborators shared by every watcher of one registry
#[derive(Clone)]
pub(crate) struct WatcherContext {
    pub(crate) fetcher: Arc<dyn FingerprintFetcher>,
    pub(crate) removal_tx: mpsc::Sender<RemovalNotice>,
    pub(crate) config: WatchConfig,
}

/// Owns the polling loop and the broadcaster of a single tag
pub struct EntityWatcher {
    id: WatcherId,
    key: EntityKey,
    coordinates: TagCoordinates,
    broadcaster: Broadcaster,
    token: CancellationToken,
    state: AtomicU8,
    /// Published by `shutdown` right before the broadcaster closes
    terminal_event: Mutex<Option<ChangeEvent>>,
}

impl std::fmt::Debug for EntityWatcher {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EntityWatcher")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EntityWatcher {
    /// Creates a watcher whose token is a child of `parent`. Call [`start`](Self::start) to poll.
    pub(crate) fn new(
        id: WatcherId,
        coordinates: TagCoordinates,
        parent: &CancellationToken,
        buffer_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            key: coordinates.key(),
            coordinates,
            broadcaster: Broadcaster::new(buffer_size),
            token: parent.child_token(),
            state: AtomicU8::new(WatcherState::Running as u8),
            terminal_event: Mutex::new(None),
        })
    }

    /// Spawns the polling loop on `tracker`
    pub(crate) fn start(
        self: &Arc<Self>,
        ctx: WatcherContext,
        tracker: &TaskTracker,
    ) {
        let watcher = Arc::clone(self);
        let name = format!("watcher {}", self.key);
        spawn_tracked(tracker, name, async move {
            watcher.run(ctx).await;
            Ok(())
        });
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn coordinates(&self) -> &TagCoordinates {
        &self.coordinates
    }

    pub fn state(&self) -> WatcherState {
        WatcherState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_shutdown(&self) -> bool {
        self.state() != WatcherState::Running
    }

    /// Subscribes to this watcher's change events.
    ///
    /// Once the watcher is shut down the returned stream is already closed.
    pub fn watch(&self) -> EventStream {
        self.broadcaster.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Stops the loop and closes every subscriber stream.
    ///
    /// Safe to call any number of times from any task; only the first call acts.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(
                WatcherState::Running as u8,
                WatcherState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        self.token.cancel();
        if let Some(event) = self.terminal_event.lock().take() {
            self.broadcaster.publish(event);
        }
        self.broadcaster.shutdown();
        self.state.store(WatcherState::Shutdown as u8, Ordering::Release);
        debug!(key = %self.key, watcher_id = self.id, "Watcher shut down");
    }

    async fn run(
        self: Arc<Self>,
        ctx: WatcherContext,
    ) {
        debug!(key = %self.key, watcher_id = self.id, "Watcher loop started");
        let mut target = WatchTarget::new(self.coordinates.clone());
        let mut ticker = poll_ticker(&ctx.config);
        let mut reported = false;

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let jitter = ctx.config.poll_jitter();
            if !jitter.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    _ = sleep(jitter) => {}
                }
            }

            match self.fetch(&ctx).await {
                Ok(fingerprint) => {
                    if target.observe(fingerprint) {
                        trace!(
                            key = %self.key,
                            fingerprint = ?target.fingerprint,
                            "Fingerprint changed"
                        );
                        self.broadcaster.publish(ChangeEvent::modified(target.clone()));
                    }
                }
                Err(e) => {
                    FETCH_FAILURES.inc();
                    let failure = WatchError::FetchFailed {
                        key: self.key.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(watcher_id = self.id, "{}", failure);

                    // Armed before the notice goes out: the reaper may shut us down right away
                    if ctx.config.emit_terminal_event {
                        *self.terminal_event.lock() = Some(ChangeEvent::deleted(target.clone()));
                    }
                    if self.report_removal(&ctx.removal_tx, ctx.config.removal_timeout()).await {
                        reported = true;
                        self.token.cancelled().await;
                        break;
                    }
                    self.terminal_event.lock().take();
                }
            }
        }

        self.shutdown();
        if !reported {
            self.release(&ctx.removal_tx);
        }
        debug!(key = %self.key, watcher_id = self.id, "Watcher loop stopped");
    }

    async fn fetch(
        &self,
        ctx: &WatcherContext,
    ) -> Result<String> {
        let duration = ctx.config.fetch_timeout();
        match timeout(duration, ctx.fetcher.fetch_fingerprint(&self.coordinates)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                key: self.key.to_string(),
                duration,
            }
            .into()),
        }
    }

    /// Asks the registry to drop this watcher's entry after an outside shutdown.
    /// The reaper ignores it once the entry belongs to another watcher.
    fn release(
        &self,
        removal_tx: &mpsc::Sender<RemovalNotice>,
    ) {
        let notice = RemovalNotice {
            key: self.key.clone(),
            watcher_id: self.id,
        };
        if let Err(e) = removal_tx.try_send(notice) {
            trace!(key = %self.key, watcher_id = self.id, error = %e, "Release notice not delivered");
        }
    }

    /// Returns true once the reaper has accepted the notice
    async fn report_removal(
        &self,
        removal_tx: &mpsc::Sender<RemovalNotice>,
        wait: Duration,
    ) -> bool {
        let notice = RemovalNotice {
            key: self.key.clone(),
            watcher_id: self.id,
        };
        match removal_tx.send_timeout(notice, wait).await {
            Ok(()) => {
                info!(key = %self.key, watcher_id = self.id, "Removal requested");
                true
            }
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(key = %self.key, "Removal request timed out, retrying on next failure");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(key = %self.key, "Registry gone, waiting for cancellation");
                false
            }
        }
    }
}

/// Fixed-rate ticker whose first tick comes one period after start.
/// Ticks missed during a slow fetch are not bunched up afterwards.
fn poll_ticker(config: &WatchConfig) -> Interval {
    let period = config.poll_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
