//! Counters and gauges for the reload lifecycle.
//!
//! Without an installed recorder these calls are no-ops.

use metrics::{counter, gauge};

/// Outcome label is `success` or `failure`.
pub fn record_reload(outcome: &'static str) {
    counter!("ipi_reload_total", "outcome" => outcome).increment(1);
}

pub fn record_file_changed() {
    counter!("ipi_file_changed_total").increment(1);
}

/// Outcome label is `updated`, `not_modified` or `failure`.
pub fn record_update_check(outcome: &'static str) {
    counter!("ipi_update_check_total", "outcome" => outcome).increment(1);
}

pub fn record_lookup(ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    counter!("ipi_lookup_total", "outcome" => outcome).increment(1);
}

pub fn set_generation(id: u64) {
    gauge!("ipi_generation").set(id as f64);
}
