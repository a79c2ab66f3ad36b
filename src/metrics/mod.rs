use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Registry;


lazy_static! {
    pub static ref EVENTS_PUBLISHED: IntCounter =
        IntCounter::new("events_published_total", "Change events published by watchers")
            .expect("metric can not be created");

    pub static ref EVENTS_DROPPED: IntCounter = IntCounter::new(
        "events_dropped_total",
        "Per-subscriber deliveries dropped because the queue was full"
    )
    .expect("metric can not be created");

    pub static ref FETCH_FAILURES: IntCounter =
        IntCounter::new("fetch_failures_total", "Failed fingerprint fetches")
            .expect("metric can not be created");

    pub static ref WATCHERS_REAPED: IntCounter =
        IntCounter::new("watchers_reaped_total", "Watchers removed after a fetch failure")
            .expect("metric can not be created");

    pub static ref ACTIVE_WATCHERS: IntGauge =
        IntGauge::new("active_watchers", "Watchers currently held by registries")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("tagwatch".to_string()), None).expect("registry can be created");
}

/// Registers every tagwatch collector on `registry`
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(EVENTS_PUBLISHED.clone()))?;
    registry.register(Box::new(EVENTS_DROPPED.clone()))?;
    registry.register(Box::new(FETCH_FAILURES.clone()))?;
    registry.register(Box::new(WATCHERS_REAPED.clone()))?;
    registry.register(Box::new(ACTIVE_WATCHERS.clone()))?;
    Ok(())
}

/// Renders every collector of [`REGISTRY`] in the Prometheus text format
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
