//! Diagnostic aggregator monitoring types
//!
//! These types expose the cross-backend counters maintained by the
//! diagnostic aggregator, alongside which monitors it is tracking.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Current state of the diagnostic aggregator
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsInfo {
    /// Backend monitors currently known, diagnostics excluded.
    pub total_backends: usize,
    /// Monitors whose backend is currently unreachable.
    pub unavailable_backends: usize,
    /// Identifiers of every tracked monitor.
    pub tracked: Vec<String>,
    /// Representative monitor used for display, when one exists.
    pub attached: Option<String>,
    /// Whether the aggregator has completed at least one reconciliation
    /// against a non-empty monitor set.
    pub settled: bool,
}

/// Trait for reading the diagnostic aggregator's state
pub trait DiagnosticsMonitoring: Send + Sync {
    fn get_diagnostics(&self) -> DiagnosticsInfo;
}
