//! Per-backend polling coordinator.
//!
//! A [`BackendMonitor`] owns the HTTP client and last-good [`Snapshot`] for
//! one backend and serializes every refresh through a single gate. Callers
//! that arrive while a refresh is in flight do not trigger a second fetch;
//! they wait and adopt the in-flight outcome. Observers registered on the
//! monitor are told about snapshot advances and availability transitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use jellywatch_apps::backend::{BackendClient, FetchError, Snapshot};
use jellywatch_apps::task_manager::TaskManager;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::utils::ShutdownMessage;

/// What a monitor tells its observers.
///
/// The event carries everything an observer needs, so observer closures
/// never have to hold a reference back to the monitor itself.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A refresh succeeded and the cached snapshot advanced.
    SnapshotUpdated(Snapshot),
    /// The backend crossed between reachable and unreachable, including the
    /// first determination after startup.
    AvailabilityChanged { available: bool },
}

type Observer = Box<dyn Fn(&MonitorEvent) + Send + Sync>;

/// Polling coordinator for one backend.
pub struct BackendMonitor {
    name: String,
    slug: String,
    enabled: bool,
    scan_interval: Option<Duration>,
    client: BackendClient,
    snapshot: RwLock<Snapshot>,
    /// Outcome of the most recent completed refresh. `None` until the first
    /// refresh finishes, which is also the "availability unknown" state.
    last_outcome: Mutex<Option<Result<(), FetchError>>>,
    /// Serializes refreshes. Nothing else is locked while a fetch is in
    /// flight, so readers keep seeing the previous snapshot.
    refresh_gate: tokio::sync::Mutex<()>,
    /// Bumped once per completed refresh. A waiter that sees it move while
    /// queued on the gate adopts the stored outcome instead of fetching.
    refresh_generation: AtomicU64,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_observer_id: AtomicU64,
}

impl BackendMonitor {
    pub fn new(config: &BackendConfig) -> Result<Self, FetchError> {
        let client = BackendClient::new(config.address())?;
        Ok(Self {
            name: config.name.clone(),
            slug: config.slug(),
            enabled: config.enabled,
            scan_interval: config.scan_interval(),
            client,
            snapshot: RwLock::new(Snapshot::default()),
            last_outcome: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Stable identifier for this monitor, derived from the backend name.
    pub fn entity_id(&self) -> String {
        format!("session_monitor_{}", self.slug)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True when this monitor refreshes on a schedule. Disabled backends and
    /// a `scan_interval_secs` of 0 both turn the schedule off.
    pub fn polling_enabled(&self) -> bool {
        self.enabled && self.scan_interval.is_some()
    }

    fn polling_period(&self) -> Option<Duration> {
        if self.enabled {
            self.scan_interval
        } else {
            None
        }
    }

    /// The last-good cached state. Survives failed refreshes untouched.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// `None` until the first refresh completes, then whether the most
    /// recent refresh succeeded.
    pub fn availability(&self) -> Option<bool> {
        self.last_outcome
            .lock()
            .unwrap()
            .as_ref()
            .map(|outcome| outcome.is_ok())
    }

    /// The error of the most recent refresh, if it failed.
    pub fn last_error(&self) -> Option<FetchError> {
        match &*self.last_outcome.lock().unwrap() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// One-shot probe used when a backend configuration is first accepted.
    pub async fn check_connection(&self) -> Result<(), FetchError> {
        self.client.check_connection().await
    }

    /// Registers an observer and returns the id to remove it with.
    pub fn add_observer<F>(&self, observer: F) -> u64
    where
        F: Fn(&MonitorEvent) + Send + Sync + 'static,
    {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap()
            .push((id, Box::new(observer)));
        id
    }

    /// Removes one observer. Returns false when the id is unknown.
    pub fn remove_observer(&self, id: u64) -> bool {
        let mut observers = self.observers.lock().unwrap();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Drops every observer. Must run when the monitor is taken out of
    /// service, so late callbacks cannot fire into torn-down state.
    pub fn teardown(&self) {
        self.observers.lock().unwrap().clear();
    }

    fn notify(&self, event: &MonitorEvent) {
        let observers = self.observers.lock().unwrap();
        for (_, observer) in observers.iter() {
            observer(event);
        }
    }

    /// Records the refresh outcome and reports whether availability crossed
    /// between reachable and unreachable (the first determination counts).
    fn record_outcome(&self, outcome: Result<(), FetchError>) -> bool {
        let mut guard = self.last_outcome.lock().unwrap();
        let before = guard.as_ref().map(|o| o.is_ok());
        let after = Some(outcome.is_ok());
        *guard = Some(outcome);
        before != after
    }

    /// Fetches the backend's state, advances the cached snapshot and
    /// returns it.
    ///
    /// Refreshes are serialized. A caller that finds one already in flight
    /// waits for it and adopts its outcome rather than issuing another
    /// fetch, so bursts of triggers collapse into a single backend hit. On
    /// failure the previous snapshot is kept and only availability moves.
    pub async fn refresh(&self) -> Result<Snapshot, FetchError> {
        let seen_generation = self.refresh_generation.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.refresh_generation.load(Ordering::Acquire) != seen_generation {
            // A refresh completed while we were queued on the gate.
            let adopted = self.last_outcome.lock().unwrap().clone();
            return match adopted {
                Some(Err(e)) => Err(e),
                _ => Ok(self.snapshot()),
            };
        }

        let fetched = self.client.fetch_state().await;
        let outcome = match fetched {
            Ok(state) => {
                let updated = {
                    let mut snapshot = self.snapshot.write().unwrap();
                    *snapshot = snapshot.advance(state.sessions, state.library_counts, Utc::now());
                    snapshot.clone()
                };
                Ok(updated)
            }
            Err(e) => Err(e),
        };

        let result = outcome.as_ref().map(|_| ()).map_err(|e| e.clone());
        let availability_changed = self.record_outcome(result);
        self.refresh_generation.fetch_add(1, Ordering::AcqRel);

        // Observers run while the gate is held, so they see events in
        // refresh order. The snapshot and outcome locks are already free.
        if let Ok(snapshot) = &outcome {
            self.notify(&MonitorEvent::SnapshotUpdated(snapshot.clone()));
        }
        if availability_changed {
            self.notify(&MonitorEvent::AvailabilityChanged {
                available: outcome.is_ok(),
            });
        }
        outcome
    }

    /// Spawns the background poll task. Does nothing for disabled backends
    /// or a poll interval of zero.
    pub fn start_polling(
        self: &Arc<Self>,
        task_manager: &TaskManager,
        mut shutdown_rx: broadcast::Receiver<ShutdownMessage>,
    ) {
        let Some(period) = self.polling_period() else {
            debug!(backend = %self.name, "Background polling is off");
            return;
        };
        let monitor = Arc::clone(self);
        task_manager.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The startup refresh already ran; consume the immediate first
            // tick so the next fetch lands one full period later.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(backend = %monitor.name, "Polling task stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.refresh().await {
                            warn!(backend = %monitor.name, "Scheduled refresh failed: {e}");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Backend config pointing at a port nothing listens on, so refreshes
    /// fail fast with a connection error.
    fn create_unreachable_backend(name: &str) -> BackendConfig {
        BackendConfig::new(
            name.to_string(),
            "127.0.0.1".to_string(),
            1,
            false,
            true,
            "test-key".to_string(),
            30,
            true,
        )
    }

    #[test]
    fn test_entity_id_uses_slug() {
        let monitor = BackendMonitor::new(&create_unreachable_backend("Living Room")).unwrap();
        assert_eq!(monitor.slug(), "living_room");
        assert_eq!(monitor.entity_id(), "session_monitor_living_room");
    }

    #[test]
    fn test_polling_enabled_matrix() {
        let mut config = create_unreachable_backend("Main");
        let monitor = BackendMonitor::new(&config).unwrap();
        assert!(monitor.polling_enabled());

        config.scan_interval_secs = 0;
        let monitor = BackendMonitor::new(&config).unwrap();
        assert!(!monitor.polling_enabled());

        config.scan_interval_secs = 30;
        config.enabled = false;
        let monitor = BackendMonitor::new(&config).unwrap();
        assert!(!monitor.polling_enabled());
        assert!(monitor.polling_period().is_none());
    }

    #[test]
    fn test_availability_unknown_before_first_refresh() {
        let monitor = BackendMonitor::new(&create_unreachable_backend("Main")).unwrap();
        assert_eq!(monitor.availability(), None);
        assert!(monitor.last_error().is_none());
        assert!(!monitor.snapshot().is_populated());
    }

    #[tokio::test]
    async fn test_failed_refresh_marks_unreachable_once() {
        let monitor = Arc::new(BackendMonitor::new(&create_unreachable_backend("Main")).unwrap());
        let events: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.add_observer(move |event| sink.lock().unwrap().push(event.clone()));

        assert!(monitor.refresh().await.is_err());
        assert_eq!(monitor.availability(), Some(false));
        assert!(monitor.last_error().is_some());

        // A second failure is not a transition; no further event fires.
        assert!(monitor.refresh().await.is_err());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            MonitorEvent::AvailabilityChanged { available: false }
        ));
    }

    #[tokio::test]
    async fn test_removed_observer_stops_receiving() {
        let monitor = Arc::new(BackendMonitor::new(&create_unreachable_backend("Main")).unwrap());
        let first: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let second: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = first.clone();
        let first_id = monitor.add_observer(move |event| sink.lock().unwrap().push(event.clone()));
        let sink = second.clone();
        monitor.add_observer(move |event| sink.lock().unwrap().push(event.clone()));

        assert!(monitor.remove_observer(first_id));
        assert!(!monitor.remove_observer(first_id));

        let _ = monitor.refresh().await;
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_drops_all_observers() {
        let monitor = Arc::new(BackendMonitor::new(&create_unreachable_backend("Main")).unwrap());
        let events: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        monitor.add_observer(move |event| sink.lock().unwrap().push(event.clone()));

        monitor.teardown();
        let _ = monitor.refresh().await;
        assert!(events.lock().unwrap().is_empty());
    }
}
