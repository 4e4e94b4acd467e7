//! Monitoring integration for the session daemon.
//!
//! The directory implements `BackendsMonitoring` directly, since it already
//! holds every monitor together with its latest rendered view. The
//! diagnostic aggregators and the manual-refresh queue are exposed through
//! small handle types instead, as neither lives in a single struct the
//! server could hold on its own.

use std::sync::Arc;

use chrono::Utc;
use jellywatch_apps::monitoring::{
    BackendStatusInfo, BackendsMonitoring, DiagnosticsInfo, DiagnosticsMonitoring, ManualRefresh,
    SessionInfo,
};

use crate::diagnostics::DiagnosticAggregator;
use crate::directory::{DiagnosticRole, MonitorDirectory};

impl BackendsMonitoring for MonitorDirectory {
    fn get_backends(&self) -> Vec<BackendStatusInfo> {
        let now = Utc::now();
        self.monitor_records()
            .into_iter()
            .map(|record| {
                let monitor = &record.monitor;
                let snapshot = monitor.snapshot();
                let state = if record.rendered.any_active {
                    "Active"
                } else {
                    "Idle"
                };
                BackendStatusInfo {
                    name: monitor.name().to_string(),
                    slug: monitor.slug().to_string(),
                    state: state.to_string(),
                    available: matches!(monitor.availability(), Some(true)),
                    polling_enabled: monitor.polling_enabled(),
                    server_version: snapshot.server_version.clone(),
                    last_updated: snapshot.last_updated_at.map(|at| at.to_rfc3339()),
                    last_update_age_secs: snapshot
                        .age(now)
                        .map(|age| age.num_seconds().max(0) as u64),
                    last_error: monitor.last_error().map(|e| e.to_string()),
                    summary: record.rendered.summary.clone(),
                    counts: record.rendered.counts.into(),
                    library_counts: snapshot.library_counts.clone(),
                    sessions: record
                        .rendered
                        .sessions
                        .iter()
                        .map(SessionInfo::from)
                        .collect(),
                }
            })
            .collect()
    }
}

/// Read-side handle over the pair of diagnostic aggregators.
pub struct DiagnosticsHandle {
    directory: Arc<MonitorDirectory>,
    total: Arc<DiagnosticAggregator>,
    errors: Arc<DiagnosticAggregator>,
}

impl DiagnosticsHandle {
    pub fn new(
        directory: Arc<MonitorDirectory>,
        total: Arc<DiagnosticAggregator>,
        errors: Arc<DiagnosticAggregator>,
    ) -> Self {
        Self {
            directory,
            total,
            errors,
        }
    }
}

impl DiagnosticsMonitoring for DiagnosticsHandle {
    fn get_diagnostics(&self) -> DiagnosticsInfo {
        let total = self.directory.diagnostic_record(DiagnosticRole::Total);
        let errors = self.directory.diagnostic_record(DiagnosticRole::Errors);
        DiagnosticsInfo {
            total_backends: total
                .as_ref()
                .and_then(|record| record.value)
                .unwrap_or(0) as usize,
            unavailable_backends: errors
                .as_ref()
                .and_then(|record| record.value)
                .unwrap_or(0) as usize,
            tracked: total
                .as_ref()
                .map(|record| record.tracked.clone())
                .unwrap_or_default(),
            attached: total.as_ref().and_then(|record| record.attached.clone()),
            settled: self.total.is_settled() && self.errors.is_settled(),
        }
    }
}

/// Forwards refresh requests from the HTTP server onto the daemon's
/// manual-refresh queue.
pub struct RefreshHandle {
    directory: Arc<MonitorDirectory>,
    sender: async_channel::Sender<String>,
}

impl RefreshHandle {
    pub fn new(directory: Arc<MonitorDirectory>, sender: async_channel::Sender<String>) -> Self {
        Self { directory, sender }
    }
}

impl ManualRefresh for RefreshHandle {
    fn request_refresh(&self, slug: &str) -> bool {
        if self.directory.monitor_by_slug(slug).is_none() {
            return false;
        }
        // The queue is unbounded; try_send only fails once shutdown closed it.
        self.sender.try_send(slug.to_string()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jellywatch_apps::backend::Snapshot;
    use jellywatch_apps::sessions::render;

    use crate::config::BackendConfig;
    use crate::coordinator::BackendMonitor;
    use crate::diagnostics::DiagnosticsTiming;

    fn create_test_monitor(name: &str) -> Arc<BackendMonitor> {
        let config = BackendConfig::new(
            name.to_string(),
            "127.0.0.1".to_string(),
            1,
            false,
            true,
            "test-key".to_string(),
            30,
            true,
        );
        Arc::new(BackendMonitor::new(&config).unwrap())
    }

    fn idle_view() -> jellywatch_apps::sessions::RenderedView {
        render(&Snapshot::default(), "{user}", "No active sessions")
    }

    #[test]
    fn test_get_backends_flattens_directory_state() {
        let directory = MonitorDirectory::new();
        directory.register_monitor(create_test_monitor("Living Room"), idle_view());

        let backends = directory.get_backends();
        assert_eq!(backends.len(), 1);
        let backend = &backends[0];
        assert_eq!(backend.name, "Living Room");
        assert_eq!(backend.slug, "living_room");
        assert_eq!(backend.state, "Idle");
        // No refresh has run: availability is unknown, reported unavailable.
        assert!(!backend.available);
        assert!(backend.polling_enabled);
        assert!(backend.last_error.is_none());
        assert!(backend.last_updated.is_none());
        assert_eq!(backend.summary, "No active sessions");
        assert_eq!(backend.counts.active, 0);
    }

    #[tokio::test]
    async fn test_get_backends_reports_the_last_fetch_error() {
        let directory = MonitorDirectory::new();
        let monitor = create_test_monitor("Main");
        directory.register_monitor(monitor.clone(), idle_view());

        assert!(monitor.refresh().await.is_err());

        let backends = directory.get_backends();
        assert!(!backends[0].available);
        assert!(backends[0].last_error.is_some());
    }

    #[test]
    fn test_backends_summary_counts_across_monitors() {
        let directory = MonitorDirectory::new();
        directory.register_monitor(create_test_monitor("First"), idle_view());
        directory.register_monitor(create_test_monitor("Second"), idle_view());

        let summary = directory.get_backends_summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.available, 0);
        assert_eq!(summary.active_sessions, 0);
    }

    #[test]
    fn test_diagnostics_handle_reads_published_records() {
        let directory = Arc::new(MonitorDirectory::new());
        directory.register_monitor(create_test_monitor("Main"), idle_view());
        directory.register_diagnostic(DiagnosticRole::Total);
        directory.register_diagnostic(DiagnosticRole::Errors);

        let total = DiagnosticAggregator::new(
            DiagnosticRole::Total,
            directory.clone(),
            DiagnosticsTiming::default(),
        );
        let errors = DiagnosticAggregator::new(
            DiagnosticRole::Errors,
            directory.clone(),
            DiagnosticsTiming::default(),
        );

        let handle = DiagnosticsHandle::new(directory, total.clone(), errors.clone());
        let info = handle.get_diagnostics();
        assert!(!info.settled);
        assert_eq!(info.total_backends, 0);
        assert!(info.tracked.is_empty());
    }

    #[test]
    fn test_refresh_handle_rejects_unknown_slugs() {
        let directory = Arc::new(MonitorDirectory::new());
        directory.register_monitor(create_test_monitor("Main"), idle_view());
        let (sender, receiver) = async_channel::unbounded();
        let handle = RefreshHandle::new(directory, sender);

        assert!(!handle.request_refresh("nonexistent"));
        assert!(receiver.is_empty());

        assert!(handle.request_refresh("main"));
        assert_eq!(receiver.try_recv().unwrap(), "main");
    }
}
