//! Deduplicating registry of entity watchers.
//!
//! ```text
//! get_or_create(coords) ── lock map ──► existing watcher ─► return
//!                                  └──► new watcher (child token) ─► start loop ─► insert
//!
//! watcher loop ── RemovalNotice ──► removal channel ──► reaper
//!                                                        ├─ lock map, remove if id matches
//!                                                        └─ shutdown watcher (lock released)
//! ```
//!
//! Cancelling the registry token cancels every watcher token. The reaper then
//! drains the map and shuts each remaining watcher down before it exits.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::watcher::RemovalNotice;
use super::watcher::WatcherContext;
use super::EntityKey;
use super::EntityWatcher;
use super::EventStream;
use super::TagCoordinates;
use super::WatcherId;
use crate::client::FingerprintFetcher;
use crate::metrics::ACTIVE_WATCHERS;
use crate::metrics::WATCHERS_REAPED;
use crate::utils::async_task::spawn_tracked;
use crate::Result;
use crate::WatchConfig;
use crate::WatchError;

type WatcherMap = HashMap<EntityKey, Arc<EntityWatcher>>;

struct RegistryInner {
    watchers: Mutex<WatcherMap>,
    ctx: WatcherContext,
    token: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

/// Holds at most one live [`EntityWatcher`] per [`EntityKey`]
#[derive(Clone)]
pub struct WatcherRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for WatcherRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatcherRegistry")
            .field("watchers", &self.len())
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl WatcherRegistry {
    /// Creates the registry and spawns its reaper.
    ///
    /// Must be called inside a tokio runtime. The registry scope is a child of
    /// `parent`; its tasks run until `parent` is cancelled or [`shutdown`](Self::shutdown) is called.
    pub fn new(
        parent: &CancellationToken,
        fetcher: Arc<dyn FingerprintFetcher>,
        config: WatchConfig,
    ) -> Self {
        let (removal_tx, removal_rx) = mpsc::channel(config.removal_channel_size.max(1));

        let inner = Arc::new(RegistryInner {
            watchers: Mutex::new(HashMap::new()),
            ctx: WatcherContext {
                fetcher,
                removal_tx,
                config,
            },
            token: parent.child_token(),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(1),
        });

        let reaper = Arc::clone(&inner);
        spawn_tracked(&inner.tracker, "reaper", async move {
            reaper.reap(removal_rx).await;
            Ok(())
        });

        Self { inner }
    }

    /// Returns the live watcher for `coordinates`, creating and starting it if needed.
    ///
    /// Fails with [`WatchError::ShutdownInProgress`] once the registry is cancelled.
    pub fn get_or_create(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<Arc<EntityWatcher>> {
        let key = coordinates.key();
        let mut watchers = self.inner.watchers.lock();

        if self.inner.token.is_cancelled() {
            return Err(WatchError::ShutdownInProgress.into());
        }

        if let Some(existing) = watchers.get(&key) {
            if !existing.is_shutdown() {
                return Ok(Arc::clone(existing));
            }
            trace!(key = %key, watcher_id = existing.id(), "Replacing shut down watcher");
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let watcher = EntityWatcher::new(
            id,
            coordinates.clone(),
            &self.inner.token,
            self.inner.ctx.config.subscriber_buffer_size,
        );
        watcher.start(self.inner.ctx.clone(), &self.inner.tracker);
        if watchers.insert(key.clone(), Arc::clone(&watcher)).is_none() {
            ACTIVE_WATCHERS.inc();
        }

        info!(key = %key, watcher_id = id, "Watcher created");
        Ok(watcher)
    }

    /// Subscribes to change events of `coordinates`
    pub fn watch(
        &self,
        coordinates: &TagCoordinates,
    ) -> Result<EventStream> {
        Ok(self.get_or_create(coordinates)?.watch())
    }

    pub fn get(
        &self,
        key: &EntityKey,
    ) -> Option<Arc<EntityWatcher>> {
        self.inner.watchers.lock().get(key).cloned()
    }

    pub fn contains(
        &self,
        key: &EntityKey,
    ) -> bool {
        self.inner.watchers.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Cancels every watcher and waits until the reaper and all loops have exited
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("Watcher registry stopped");
    }
}

impl RegistryInner {
    async fn reap(
        &self,
        mut removal_rx: mpsc::Receiver<RemovalNotice>,
    ) {
        debug!("Reaper started");
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                notice = removal_rx.recv() => match notice {
                    Some(notice) => self.remove(&notice.key, notice.watcher_id),
                    None => break,
                },
            }
        }

        let remaining: Vec<_> = self.watchers.lock().drain().map(|(_, w)| w).collect();
        ACTIVE_WATCHERS.sub(remaining.len() as i64);
        debug!(remaining = remaining.len(), "Reaper draining watchers");
        for watcher in remaining {
            watcher.shutdown();
        }
        debug!("Reaper stopped");
    }

    /// Removes `key` only while it still maps to watcher `id`; stale notices are ignored
    fn remove(
        &self,
        key: &EntityKey,
        id: WatcherId,
    ) {
        let removed = {
            let mut watchers = self.watchers.lock();
            if watchers.get(key).is_some_and(|w| w.id() == id) {
                ACTIVE_WATCHERS.dec();
                watchers.remove(key)
            } else {
                None
            }
        };

        match removed {
            Some(watcher) => {
                watcher.shutdown();
                WATCHERS_REAPED.inc();
                info!(key = %key, watcher_id = id, "Watcher reaped");
            }
            None => trace!(key = %key, watcher_id = id, "Stale removal notice ignored"),
        }
    }
}
