//! Synchronizer metrics.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Completed-cycle counter, labeled by outcome (`noop`, `applied`).
pub const SYNC_CYCLES: &str = "vitrine_sync_cycles_total";

/// Aborted-cycle counter, labeled by error kind.
pub const SYNC_CYCLE_ERRORS: &str = "vitrine_sync_cycle_errors_total";

/// Diff sets folded into the local snapshot.
pub const DIFFS_APPLIED: &str = "vitrine_sync_diffs_applied_total";

/// Cycle duration histogram.
pub const CYCLE_DURATION: &str = "vitrine_sync_cycle_duration_seconds";

/// Registers all synchronizer metric descriptions.
///
/// Call once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(SYNC_CYCLES, "Total completed sync cycles");
    describe_counter!(SYNC_CYCLE_ERRORS, "Total aborted sync cycles");
    describe_counter!(DIFFS_APPLIED, "Total diff sets folded locally");
    describe_histogram!(CYCLE_DURATION, "Duration of sync cycles in seconds");
}

/// Records a completed cycle.
pub fn record_cycle(outcome: &'static str, diffs_applied: usize, duration_secs: f64) {
    counter!(SYNC_CYCLES, "outcome" => outcome).increment(1);
    if diffs_applied > 0 {
        counter!(DIFFS_APPLIED).increment(diffs_applied as u64);
    }
    histogram!(CYCLE_DURATION, "outcome" => outcome).record(duration_secs);
}

/// Records an aborted cycle.
pub fn record_cycle_error(kind: &'static str) {
    counter!(SYNC_CYCLE_ERRORS, "error" => kind).increment(1);
}
