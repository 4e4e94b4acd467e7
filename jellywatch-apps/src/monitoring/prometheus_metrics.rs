//! Prometheus metric definitions for the monitoring server
//!
//! Metrics are gauges repopulated from the snapshot cache on every scrape,
//! so they never drift from what the JSON API reports. Sources that are not
//! configured leave their metrics unregistered.

use prometheus::{Gauge, GaugeVec, Opts, Registry};

/// Registry plus every gauge the `/metrics` endpoint can serve.
#[derive(Clone)]
pub struct PrometheusMetrics {
    pub registry: Registry,
    /// Always registered.
    pub uptime_seconds: Gauge,
    /// 1 when the backend's last refresh succeeded, 0 otherwise.
    pub backend_up: Option<GaugeVec>,
    pub backend_active_sessions: Option<GaugeVec>,
    pub backend_sessions_by_type: Option<GaugeVec>,
    pub backend_snapshot_age_seconds: Option<GaugeVec>,
    pub backend_library_items: Option<GaugeVec>,
    pub backends_total: Option<Gauge>,
    pub backends_unavailable: Option<Gauge>,
}

impl PrometheusMetrics {
    pub fn new(has_backends: bool, has_diagnostics: bool) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uptime_seconds = Gauge::new(
            "jellywatch_uptime_seconds",
            "Seconds since the monitoring server started",
        )?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let mut metrics = Self {
            registry,
            uptime_seconds,
            backend_up: None,
            backend_active_sessions: None,
            backend_sessions_by_type: None,
            backend_snapshot_age_seconds: None,
            backend_library_items: None,
            backends_total: None,
            backends_unavailable: None,
        };

        if has_backends {
            let backend_up = GaugeVec::new(
                Opts::new(
                    "jellywatch_backend_up",
                    "1 when the backend's last refresh succeeded",
                ),
                &["backend"],
            )?;
            metrics.registry.register(Box::new(backend_up.clone()))?;
            metrics.backend_up = Some(backend_up);

            let backend_active_sessions = GaugeVec::new(
                Opts::new(
                    "jellywatch_backend_active_sessions",
                    "Sessions currently playing on the backend",
                ),
                &["backend"],
            )?;
            metrics
                .registry
                .register(Box::new(backend_active_sessions.clone()))?;
            metrics.backend_active_sessions = Some(backend_active_sessions);

            let backend_sessions_by_type = GaugeVec::new(
                Opts::new(
                    "jellywatch_backend_sessions_by_type",
                    "Active sessions on the backend, partitioned by media type",
                ),
                &["backend", "media_type"],
            )?;
            metrics
                .registry
                .register(Box::new(backend_sessions_by_type.clone()))?;
            metrics.backend_sessions_by_type = Some(backend_sessions_by_type);

            let backend_snapshot_age_seconds = GaugeVec::new(
                Opts::new(
                    "jellywatch_backend_snapshot_age_seconds",
                    "Seconds since the backend's last successful refresh",
                ),
                &["backend"],
            )?;
            metrics
                .registry
                .register(Box::new(backend_snapshot_age_seconds.clone()))?;
            metrics.backend_snapshot_age_seconds = Some(backend_snapshot_age_seconds);

            let backend_library_items = GaugeVec::new(
                Opts::new(
                    "jellywatch_backend_library_items",
                    "Library item counts reported by the backend",
                ),
                &["backend", "kind"],
            )?;
            metrics
                .registry
                .register(Box::new(backend_library_items.clone()))?;
            metrics.backend_library_items = Some(backend_library_items);
        }

        if has_diagnostics {
            let backends_total = Gauge::new(
                "jellywatch_backends_total",
                "Backend monitors tracked by the diagnostic aggregator",
            )?;
            metrics.registry.register(Box::new(backends_total.clone()))?;
            metrics.backends_total = Some(backends_total);

            let backends_unavailable = Gauge::new(
                "jellywatch_backends_unavailable",
                "Tracked backend monitors whose backend is unreachable",
            )?;
            metrics
                .registry
                .register(Box::new(backends_unavailable.clone()))?;
            metrics.backends_unavailable = Some(backends_unavailable);
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_follow_configured_sources() {
        let bare = PrometheusMetrics::new(false, false).unwrap();
        assert!(bare.backend_up.is_none());
        assert!(bare.backends_total.is_none());

        let full = PrometheusMetrics::new(true, true).unwrap();
        assert!(full.backend_up.is_some());
        assert!(full.backend_library_items.is_some());
        assert!(full.backends_total.is_some());
        assert!(full.backends_unavailable.is_some());
    }

    #[test]
    fn gauges_are_wired_into_the_registry() {
        let metrics = PrometheusMetrics::new(true, true).unwrap();
        metrics.uptime_seconds.set(42.0);
        if let Some(ref gauge) = metrics.backend_up {
            gauge.with_label_values(&["main"]).set(1.0);
        }

        let families = metrics.registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"jellywatch_uptime_seconds"));
        assert!(names.contains(&"jellywatch_backend_up"));
        assert!(names.contains(&"jellywatch_backends_total"));
    }
}
