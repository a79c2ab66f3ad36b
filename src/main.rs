use std::env;
use std::sync::Arc;
use std::time::Duration;

use tagwatch::metrics::gather_text;
use tagwatch::metrics::register_custom_metrics;
use tagwatch::metrics::REGISTRY;
use tagwatch::EndpointHub;
use tagwatch::Error;
use tagwatch::LogConfig;
use tagwatch::RegistryClient;
use tagwatch::Result;
use tagwatch::Settings;
use tagwatch::TagCoordinates;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let override_path = env::args().nth(1);
    let settings = Settings::load(override_path.as_deref())?;

    // Initializing Logs
    init_observability(&settings.log)?;
    register_custom_metrics(&REGISTRY).map_err(|e| Error::Fatal(format!("metrics: {e}")))?;

    // Initializing Shutdown Signal
    let shutdown = CancellationToken::new();

    let hub = EndpointHub::new(&settings.endpoints, settings.watch.clone(), &shutdown)?;
    let retry_delay = Duration::from_millis(settings.watch.poll_interval_ms);

    for target in &settings.targets {
        let client = hub.resolve(&target.endpoint)?;
        tokio::spawn(follow_target(
            client,
            target.coordinates(),
            shutdown.clone(),
            retry_delay,
        ));
    }
    info!(
        endpoints = ?hub.list(),
        targets = settings.targets.len(),
        "Watching. Waiting for CTRL+C signal..."
    );

    if let Err(e) = wait_for_signal().await {
        error!("Failed to listen for shutdown signals: {:?}", e);
    }
    shutdown.cancel();
    hub.shutdown().await;

    debug!("final metrics:\n{}", gather_text());
    info!("Exiting program.");
    Ok(())
}

/// Logs every change of one tag, re-subscribing when its watcher gets reaped
async fn follow_target(
    client: Arc<RegistryClient>,
    coordinates: TagCoordinates,
    shutdown: CancellationToken,
    retry_delay: Duration,
) {
    let key = coordinates.key();
    while !shutdown.is_cancelled() {
        let mut events = match client.watch(&coordinates) {
            Ok(events) => events,
            Err(e) => {
                debug!(key = %key, error = %e, "Watch rejected");
                return;
            }
        };

        while let Some(event) = events.next().await {
            info!(
                endpoint = client.endpoint(),
                key = %key,
                kind = ?event.kind,
                fingerprint = ?event.target.fingerprint,
                "Tag changed"
            );
        }

        warn!(key = %key, "Watch stream closed");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

async fn wait_for_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

pub fn init_observability(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .map_err(|e| Error::ConfigInvalid(format!("log.level: {e}")))?;

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);
    tracing_subscriber::registry()
        .with(base_subscriber)
        .try_init()
        .map_err(|e| Error::Fatal(format!("logging: {e}")))?;

    Ok(())
}
