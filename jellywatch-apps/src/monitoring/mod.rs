//! Monitoring surface for media-server watch daemons.
//!
//! Exposes the polling state as an HTTP JSON API plus Prometheus metrics.
//! Everything here is read-only except the manual refresh hook.
//!
//! ## Architecture
//!
//! - **Backends**: one monitor per configured media server
//! - **Diagnostics**: the cross-backend total/error aggregator

pub mod backends;
pub mod diagnostics;
pub mod http_server;
pub mod prometheus_metrics;
pub mod snapshot_cache;

pub use backends::{
    BackendMetadata, BackendStatusInfo, BackendsMonitoring, BackendsSummary, ManualRefresh,
    SessionCountsInfo, SessionInfo,
};
pub use diagnostics::{DiagnosticsInfo, DiagnosticsMonitoring};
pub use http_server::MonitoringServer;
pub use snapshot_cache::{MonitoringSnapshot, SnapshotCache};

use utoipa::ToSchema;

/// Global statistics from `/api/v1/global` endpoint
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct GlobalInfo {
    pub backends: BackendsSummary,
    pub uptime_secs: u64,
}
