//! Periodically refreshed copy of the monitoring data.
//!
//! API handlers never read the live polling state. Every request would
//! otherwise take the same locks the coordinators and the diagnostic
//! aggregators write under, so a background task copies the monitoring
//! views into a [`MonitoringSnapshot`] on a fixed interval and the HTTP
//! layer serves that copy.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::backends::{BackendStatusInfo, BackendsMonitoring, BackendsSummary};
use super::diagnostics::{DiagnosticsInfo, DiagnosticsMonitoring};

/// Point-in-time copy of everything the API can serve.
///
/// A field is `None` when the corresponding source is not wired up, or
/// before the first refresh.
#[derive(Debug, Clone, Default)]
pub struct MonitoringSnapshot {
    pub timestamp: Option<Instant>,
    pub backends: Option<Vec<BackendStatusInfo>>,
    pub backends_summary: Option<BackendsSummary>,
    pub diagnostics: Option<DiagnosticsInfo>,
}

impl MonitoringSnapshot {
    /// Time since this copy was taken. `None` until the first refresh.
    pub fn age(&self) -> Option<Duration> {
        self.timestamp.map(|taken| taken.elapsed())
    }

    /// A snapshot that has never been refreshed is always stale.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age().map_or(true, |age| age > max_age)
    }
}

/// Cache standing between the HTTP layer and the monitoring sources.
///
/// `refresh()` is the only path that reads the live state; `get_snapshot()`
/// hands out the last copy and may lag by up to `refresh_interval`.
pub struct SnapshotCache {
    snapshot: RwLock<MonitoringSnapshot>,
    refresh_interval: Duration,
    backends_source: Option<Arc<dyn BackendsMonitoring + Send + Sync>>,
    diagnostics_source: Option<Arc<dyn DiagnosticsMonitoring + Send + Sync>>,
}

impl SnapshotCache {
    pub fn new(
        refresh_interval: Duration,
        backends_source: Option<Arc<dyn BackendsMonitoring + Send + Sync>>,
        diagnostics_source: Option<Arc<dyn DiagnosticsMonitoring + Send + Sync>>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(MonitoringSnapshot::default()),
            refresh_interval,
            backends_source,
            diagnostics_source,
        }
    }

    /// Clone of the last refreshed copy. Never touches the polling state.
    pub fn get_snapshot(&self) -> MonitoringSnapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// Read every wired source and replace the cached copy wholesale.
    ///
    /// This is the one place that goes through the monitoring traits, and
    /// it runs on the refresher task, not per request.
    pub fn refresh(&self) {
        let snapshot = MonitoringSnapshot {
            timestamp: Some(Instant::now()),
            backends: self.backends_source.as_ref().map(|s| s.get_backends()),
            backends_summary: self
                .backends_source
                .as_ref()
                .map(|s| s.get_backends_summary()),
            diagnostics: self
                .diagnostics_source
                .as_ref()
                .map(|s| s.get_diagnostics()),
        };
        *self.snapshot.write().unwrap() = snapshot;
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
