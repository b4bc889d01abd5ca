//! Repository metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Repository operations by operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "vguard_repository_operations_total";

    /// Updates rejected by the lifecycle transition table.
    pub const REJECTED_UPDATES_TOTAL: &str = "vguard_repository_rejected_updates_total";
}

/// Record one repository operation.
pub fn record_operation(operation: &'static str, ok: bool) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Record an update rejected by the state machine.
pub fn record_rejected_update(update: &'static str, stale: bool) {
    counter!(
        names::REJECTED_UPDATES_TOTAL,
        "update" => update,
        "reason" => if stale { "stale_run" } else { "invalid" }
    )
    .increment(1);
}
