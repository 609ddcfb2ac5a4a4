//! Telemetry recorder shared by all mode strategies.
//!
//! Every backend call records exactly one duration sample, success or failure,
//! so latency and error-rate dashboards stay complete for failing requests.

use std::time::Instant;

use dualstore_core::Mode;
use metrics::{counter, histogram};

/// Side-effect-only recorder; cheap to clone into background tasks.
#[derive(Debug, Clone, Default)]
pub struct RouterMetrics;

impl RouterMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Latency of one legacy-backend call.
    pub fn record_legacy_duration(
        &self,
        failed: bool,
        mode: Mode,
        kind: &str,
        operation: &'static str,
        start: Instant,
    ) {
        histogram!(
            "dualstore_legacy_duration_seconds",
            start.elapsed().as_secs_f64(),
            "failed" => flag(failed),
            "mode" => mode.as_str(),
            "kind" => kind.to_string(),
            "operation" => operation
        );
    }

    /// Latency of one unified-backend call.
    pub fn record_storage_duration(
        &self,
        failed: bool,
        mode: Mode,
        kind: &str,
        operation: &'static str,
        start: Instant,
    ) {
        histogram!(
            "dualstore_storage_duration_seconds",
            start.elapsed().as_secs_f64(),
            "failed" => flag(failed),
            "mode" => mode.as_str(),
            "kind" => kind.to_string(),
            "operation" => operation
        );
    }

    /// Agreement signal between the two backends for one operation.
    pub fn record_outcome(&self, mode: Mode, kind: &str, same: bool, operation: &'static str) {
        counter!(
            "dualstore_outcome_total",
            1u64,
            "mode" => mode.as_str(),
            "kind" => kind.to_string(),
            "operation" => operation,
            "outcome" => if same { "same" } else { "different" }
        );
    }
}

fn flag(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}
