//! Processing run metrics.

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    pub const RUNS_STARTED_TOTAL: &str = "vguard_runs_started_total";
    pub const RUNS_FINISHED_TOTAL: &str = "vguard_runs_finished_total";
    pub const RUN_DURATION_SECONDS: &str = "vguard_run_duration_seconds";
    pub const RUNS_IN_FLIGHT: &str = "vguard_runs_in_flight";
    pub const DUPLICATE_TRIGGERS_TOTAL: &str = "vguard_duplicate_triggers_total";
    pub const PERSIST_FAILURES_TOTAL: &str = "vguard_persist_failures_total";
    pub const SWEEP_DELETIONS_TOTAL: &str = "vguard_sweep_deletions_total";
}

pub fn record_run_started() {
    counter!(names::RUNS_STARTED_TOTAL).increment(1);
}

/// `outcome` is one of the [`RunOutcome`](crate::RunOutcome) labels.
pub fn record_run_finished(outcome: &'static str, duration_secs: f64) {
    counter!(names::RUNS_FINISHED_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn set_runs_in_flight(count: usize) {
    gauge!(names::RUNS_IN_FLIGHT).set(count as f64);
}

pub fn record_duplicate_trigger() {
    counter!(names::DUPLICATE_TRIGGERS_TOTAL).increment(1);
}

pub fn record_persist_failure(update: &'static str) {
    counter!(names::PERSIST_FAILURES_TOTAL, "update" => update).increment(1);
}

/// `kind` is `tombstone` or `orphan`.
pub fn record_sweep_deletion(kind: &'static str, count: u64) {
    counter!(names::SWEEP_DELETIONS_TOTAL, "kind" => kind).increment(count);
}
