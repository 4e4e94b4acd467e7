//! In-process entity directory: the daemon's state sink.
//!
//! Session monitors and diagnostic counters register here under stable
//! entity ids. The directory stores each monitor's latest rendered view and
//! each diagnostic's published state, and fans registry and availability
//! events out to listeners. It never calls back into the entities it holds;
//! consumers read, entities publish.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use jellywatch_apps::sessions::RenderedView;
use tracing::{debug, warn};

use crate::coordinator::BackendMonitor;

/// Which fleet-wide counter a diagnostic entity publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticRole {
    /// Counts every tracked session monitor.
    Total,
    /// Counts the tracked monitors whose backend is unreachable.
    Errors,
}

impl DiagnosticRole {
    /// Fixed entity id for this role.
    pub fn entity_id(&self) -> &'static str {
        match self {
            DiagnosticRole::Total => "active_sessions_total",
            DiagnosticRole::Errors => "backends_unavailable",
        }
    }

    /// The role owning this entity id, when it is a diagnostic id.
    pub fn of_entity_id(entity_id: &str) -> Option<DiagnosticRole> {
        [DiagnosticRole::Total, DiagnosticRole::Errors]
            .into_iter()
            .find(|role| role.entity_id() == entity_id)
    }
}

/// Registry and availability notifications fanned out to listeners.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// An entity was registered under this id.
    Registered(String),
    /// The entity with this id was removed.
    Removed(String),
    /// A monitor's backend crossed between reachable and unreachable.
    AvailabilityChanged { entity_id: String, available: bool },
}

type Listener = Box<dyn Fn(&DirectoryEvent) + Send + Sync>;

/// A registered session monitor and its latest rendered view.
#[derive(Clone)]
pub struct MonitorRecord {
    pub monitor: Arc<BackendMonitor>,
    pub rendered: RenderedView,
}

/// A registered diagnostic counter and its last published state.
#[derive(Debug, Clone)]
pub struct DiagnosticRecord {
    pub role: DiagnosticRole,
    /// Last published count; `None` until the first reconciliation lands.
    pub value: Option<u64>,
    /// Entity ids counted by the last reconciliation.
    pub tracked: Vec<String>,
    /// Representative entity shown alongside the count.
    pub attached: Option<String>,
}

enum DirectoryEntry {
    Monitor(MonitorRecord),
    Diagnostic(DiagnosticRecord),
}

/// The directory itself. Cheap to share behind an `Arc`; every method takes
/// `&self`.
#[derive(Default)]
pub struct MonitorDirectory {
    entries: RwLock<BTreeMap<String, DirectoryEntry>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl MonitorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session monitor under its entity id, seeded with an
    /// initial rendered view (the idle view until the first refresh lands).
    pub fn register_monitor(&self, monitor: Arc<BackendMonitor>, initial: RenderedView) {
        let entity_id = monitor.entity_id();
        let replaced = {
            let mut entries = self.entries.write().unwrap();
            entries
                .insert(
                    entity_id.clone(),
                    DirectoryEntry::Monitor(MonitorRecord {
                        monitor,
                        rendered: initial,
                    }),
                )
                .is_some()
        };
        if replaced {
            warn!(%entity_id, "Monitor entity re-registered over an existing entry");
        }
        self.notify(&DirectoryEvent::Registered(entity_id));
    }

    /// Creates the diagnostic entity for `role` unless it already exists.
    /// Returns true when a new entry was created.
    pub fn register_diagnostic(&self, role: DiagnosticRole) -> bool {
        let entity_id = role.entity_id().to_string();
        let created = {
            let mut entries = self.entries.write().unwrap();
            match entries.entry(entity_id.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(DirectoryEntry::Diagnostic(DiagnosticRecord {
                        role,
                        value: None,
                        tracked: Vec::new(),
                        attached: None,
                    }));
                    true
                }
            }
        };
        if created {
            self.notify(&DirectoryEvent::Registered(entity_id));
        }
        created
    }

    /// Removes an entity. A removed monitor is torn down so its observers
    /// stop firing. Returns false when the id is unknown.
    pub fn remove(&self, entity_id: &str) -> bool {
        let removed = self.entries.write().unwrap().remove(entity_id);
        match removed {
            Some(DirectoryEntry::Monitor(record)) => {
                record.monitor.teardown();
                self.notify(&DirectoryEvent::Removed(entity_id.to_string()));
                true
            }
            Some(DirectoryEntry::Diagnostic(_)) => {
                self.notify(&DirectoryEvent::Removed(entity_id.to_string()));
                true
            }
            None => false,
        }
    }

    /// Stores a monitor's new rendered view. Publishing into an entity that
    /// is no longer registered is a no-op.
    pub fn publish_view(&self, entity_id: &str, rendered: RenderedView) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(entity_id) {
            Some(DirectoryEntry::Monitor(record)) => {
                record.rendered = rendered;
                true
            }
            _ => {
                debug!(entity_id, "Dropped a view for an unregistered entity");
                false
            }
        }
    }

    /// Forwards a monitor's availability transition to the listeners.
    /// Dropped when the entity is no longer registered.
    pub fn publish_availability(&self, entity_id: &str, available: bool) -> bool {
        let known = matches!(
            self.entries.read().unwrap().get(entity_id),
            Some(DirectoryEntry::Monitor(_))
        );
        if known {
            self.notify(&DirectoryEvent::AvailabilityChanged {
                entity_id: entity_id.to_string(),
                available,
            });
        }
        known
    }

    /// Stores a diagnostic counter's published state. Publishing into a
    /// missing entity is a no-op; the self-heal sweep recreates it later.
    pub fn publish_diagnostic(
        &self,
        role: DiagnosticRole,
        value: u64,
        tracked: Vec<String>,
        attached: Option<String>,
    ) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(role.entity_id()) {
            Some(DirectoryEntry::Diagnostic(record)) => {
                record.value = Some(value);
                record.tracked = tracked;
                record.attached = attached;
                true
            }
            _ => false,
        }
    }

    /// Monitor records in entity-id order.
    pub fn monitor_records(&self) -> Vec<MonitorRecord> {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter_map(|entry| match entry {
                DirectoryEntry::Monitor(record) => Some(record.clone()),
                DirectoryEntry::Diagnostic(_) => None,
            })
            .collect()
    }

    /// The monitor registered for a backend slug, if any.
    pub fn monitor_by_slug(&self, slug: &str) -> Option<Arc<BackendMonitor>> {
        let entity_id = format!("session_monitor_{slug}");
        match self.entries.read().unwrap().get(&entity_id) {
            Some(DirectoryEntry::Monitor(record)) => Some(record.monitor.clone()),
            _ => None,
        }
    }

    /// The published state of one diagnostic role, if registered.
    pub fn diagnostic_record(&self, role: DiagnosticRole) -> Option<DiagnosticRecord> {
        match self.entries.read().unwrap().get(role.entity_id()) {
            Some(DirectoryEntry::Diagnostic(record)) => Some(record.clone()),
            _ => None,
        }
    }

    /// Entity id and current availability of every enabled monitor, in
    /// entity-id order. Diagnostic entities and disabled backends are not
    /// part of this view; it is what the aggregators reconcile against.
    pub fn monitor_states(&self) -> Vec<(String, Option<bool>)> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter_map(|(entity_id, entry)| match entry {
                DirectoryEntry::Monitor(record) if record.monitor.enabled() => {
                    Some((entity_id.clone(), record.monitor.availability()))
                }
                _ => None,
            })
            .collect()
    }

    /// True when at least one monitor entity exists, enabled or not.
    pub fn has_monitors(&self) -> bool {
        self.entries
            .read()
            .unwrap()
            .values()
            .any(|entry| matches!(entry, DirectoryEntry::Monitor(_)))
    }

    /// Subscribes to directory events. Returns the id to unsubscribe with.
    pub fn subscribe<F>(&self, listener: F) -> u64
    where
        F: Fn(&DirectoryEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, Box::new(listener)));
        id
    }

    /// Removes one listener. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify(&self, event: &DirectoryEvent) {
        let listeners = self.listeners.lock().unwrap();
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }
}
