//! Optional metrics instrumentation for prizeflow.
//!
//! When the `observe` feature is enabled, the draw path and the recorder emit
//! counters and histograms via the [`metrics`] crate. A downstream
//! application must install a metrics recorder to collect them.
//!
//! Without the feature every function in this module is a no-op.

/// Record a finished draw.
///
/// - `prizeflow.draws_total` – counter with `outcome` label
#[inline]
pub fn record_draw(outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("prizeflow.draws_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// Record one allocation script.
///
/// - `prizeflow.allocation.total` – counter with `result` label (`granted` / `exhausted`)
/// - `prizeflow.allocation.duration_seconds` – histogram
#[inline]
pub fn record_allocation(duration: std::time::Duration, granted: bool) {
    #[cfg(feature = "observe")]
    {
        let result = if granted { "granted" } else { "exhausted" };
        metrics::counter!("prizeflow.allocation.total", "result" => result).increment(1);
        metrics::histogram!("prizeflow.allocation.duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, granted);
    }
}

/// Record what the recorder did with one message.
///
/// - `prizeflow.recorder.messages_total` – counter with `outcome` label
#[inline]
pub fn record_message(outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("prizeflow.recorder.messages_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// Record an entry written to the dead-letter log.
///
/// - `prizeflow.dead_letters_total` – counter with `source` label
#[inline]
pub fn record_dead_letter(source: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("prizeflow.dead_letters_total", "source" => source).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = source;
    }
}
