//! Prometheus metrics for watch sessions.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

/// Raw events received from event sources.
pub static EVENTS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sourcewatch_events_received_total",
        "Filesystem events received"
    )
    .unwrap()
});

/// Events dropped by kind, ignore status or path resolution.
pub static EVENTS_DISCARDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sourcewatch_events_discarded_total",
        "Filesystem events discarded before batching"
    )
    .unwrap()
});

/// Batches delivered to handlers.
pub static BATCHES_FLUSHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sourcewatch_batches_flushed_total",
        "Change batches delivered to handlers"
    )
    .unwrap()
});

/// Errors reported by event sources.
pub static WATCH_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("sourcewatch_watch_errors_total", "Event source errors").unwrap()
});

/// Directories currently registered with event sources.
pub static WATCHED_DIRS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sourcewatch_watched_dirs", "Directories being watched").unwrap()
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    // Access lazy statics to register them
    let _ = &*EVENTS_RECEIVED;
    let _ = &*EVENTS_DISCARDED;
    let _ = &*BATCHES_FLUSHED;
    let _ = &*WATCH_ERRORS;
    let _ = &*WATCHED_DIRS;

    tracing::debug!("Prometheus metrics initialized");
}
