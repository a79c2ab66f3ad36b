use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::error;
use tracing::trace;

use crate::Result;

/// Spawns `fut` on `tracker` and logs the error it may end with.
///
/// Tracking lets the owner wait for every spawned loop on shutdown.
pub(crate) fn spawn_tracked<Fut>(
    tracker: &TaskTracker,
    name: impl Into<String>,
    fut: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.into();
    tracker.spawn(async move {
        trace!(task = %name, "spawned task started");
        if let Err(e) = fut.await {
            error!(task = %name, error = ?e, "spawned task stopped with an error");
        }
    })
}
