//! Observability (ambient, carried even though spec.md names it only as
//! "observable when the metrics feature is enabled"): the two gauges/timers
//! spec.md §6 names, behind the `metrics` Cargo feature. A no-op when the
//! feature is disabled, mirroring how the teacher wires optional
//! `tracing`/`metrics` facades.

/// Record the current response-file cache size.
pub fn record_cache_entries(entries: usize) {
    #[cfg(feature = "metrics-observability")]
    {
        metrics::gauge!("response.file.cache.entries").set(entries as f64);
    }
    #[cfg(not(feature = "metrics-observability"))]
    {
        let _ = entries;
    }
}

/// Record one script execution's duration, in milliseconds.
pub fn record_script_duration(duration_ms: f64) {
    #[cfg(feature = "metrics-observability")]
    {
        metrics::histogram!("script.execution.duration").record(duration_ms);
    }
    #[cfg(not(feature = "metrics-observability"))]
    {
        let _ = duration_ms;
    }
}
