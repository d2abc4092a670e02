//! Minimal telemetry facade.
//!
//! Named monotonic counters plus thin record/span helpers over `tracing`.
//! Exporter wiring (OTLP etc.) lives outside this crate; components only
//! see this surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::info;

static COUNTERS: OnceLock<Mutex<HashMap<String, &'static AtomicU64>>> = OnceLock::new();

fn counters() -> &'static Mutex<HashMap<String, &'static AtomicU64>> {
    COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Increment a named counter by `delta`, creating it at zero on first use.
pub fn increment(name: &str, delta: u64) -> u64 {
    let mut map = counters().lock().unwrap();
    let counter = map
        .entry(name.to_string())
        .or_insert_with(|| Box::leak(Box::new(AtomicU64::new(0))));
    counter.fetch_add(delta, Ordering::Relaxed) + delta
}

/// Current value of a named counter, zero if never incremented.
pub fn value(name: &str) -> u64 {
    counters()
        .lock()
        .unwrap()
        .get(name)
        .map(|c| c.load(Ordering::Relaxed))
        .unwrap_or(0)
}

/// Snapshot of every counter, for status output and tests.
pub fn snapshot() -> Vec<(String, u64)> {
    let mut out: Vec<(String, u64)> = counters()
        .lock()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
        .collect();
    out.sort();
    out
}

/// Record a named event with a duration, as a structured log line.
pub fn record_duration(operation: &str, duration_ms: u64) {
    increment(&format!("{operation}.count"), 1);
    increment(&format!("{operation}.total_ms"), duration_ms);
    info!(operation, duration_ms, "telemetry.record");
}

/// Run `f` inside a named `tracing` span, recording its wall-clock duration.
pub fn with_span<T>(operation: &str, f: impl FnOnce() -> T) -> T {
    let span = tracing::info_span!("op", operation);
    let _guard = span.enter();
    let start = std::time::Instant::now();
    let out = f();
    record_duration(operation, start.elapsed().as_millis() as u64);
    out
}
