//! Fleet-wide diagnostic counters over the monitor set.
//!
//! Two [`DiagnosticAggregator`] instances reconcile against the directory:
//! one publishes the total monitor count, the other the count of
//! unreachable backends. Every trigger funnels through a [`DebounceGate`]
//! so a burst of backend events costs a single reconciliation pass. A
//! periodic tick recounts unconditionally, and a slow self-heal sweep
//! recreates the diagnostic entities if they disappear from the directory.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jellywatch_apps::task_manager::TaskManager;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::directory::{DiagnosticRole, DirectoryEvent, MonitorDirectory};
use crate::status::StatusSender;
use crate::utils::ShutdownMessage;

/// Timing knobs for the aggregators, in one place so tests can shrink them.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsTiming {
    /// Delay before a retry pass while the monitor set is still empty.
    pub settle: Duration,
    /// Window in which bursts of triggers collapse into one pass.
    pub debounce: Duration,
    /// Cadence of unconditional recounts.
    pub periodic: Duration,
    /// Cadence of the sweep that recreates missing diagnostic entities.
    pub self_heal: Duration,
}

impl Default for DiagnosticsTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(10),
            debounce: Duration::from_secs(5),
            periodic: Duration::from_secs(60),
            self_heal: Duration::from_secs(300),
        }
    }
}

/// Coalesces rapid triggers into one delayed trigger.
///
/// At most one scheduled trigger exists per gate; arming cancels any
/// pending one and starts a fresh delay. The fired triggers land on the
/// channel handed out by [`DebounceGate::new`], where a single consumer
/// runs the actual work, so cancellation can never interleave two passes.
pub struct DebounceGate {
    pending: Mutex<Option<JoinHandle<()>>>,
    trigger_tx: async_channel::Sender<()>,
}

impl DebounceGate {
    /// Creates a gate and the stream its fired triggers arrive on.
    pub fn new() -> (Arc<Self>, async_channel::Receiver<()>) {
        let (trigger_tx, trigger_rx) = async_channel::unbounded();
        let gate = Arc::new(Self {
            pending: Mutex::new(None),
            trigger_tx,
        });
        (gate, trigger_rx)
    }

    /// Schedules a trigger `delay` from now, cancelling any trigger still
    /// pending. A burst of arms inside the window fires exactly once.
    pub fn arm(self: &Arc<Self>, delay: Duration) {
        let gate = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // try_send on an unbounded channel only fails once closed.
            let _ = gate.trigger_tx.try_send(());
        });
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }
}

/// One diagnostic counter reconciling against the directory's monitor set.
pub struct DiagnosticAggregator {
    role: DiagnosticRole,
    directory: Arc<MonitorDirectory>,
    timing: DiagnosticsTiming,
    gate: Arc<DebounceGate>,
    trigger_rx: async_channel::Receiver<()>,
    /// False until a pass has seen a non-empty monitor set.
    settled: AtomicBool,
    /// Entity ids counted by the previous pass, for membership-change
    /// detection.
    tracked: Mutex<Vec<String>>,
    /// Representative entity. Only recomputed when membership changes.
    attached: Mutex<Option<String>>,
    /// Completed (non-retry) reconciliation passes.
    passes: AtomicU64,
}

impl DiagnosticAggregator {
    pub fn new(
        role: DiagnosticRole,
        directory: Arc<MonitorDirectory>,
        timing: DiagnosticsTiming,
    ) -> Arc<Self> {
        let (gate, trigger_rx) = DebounceGate::new();
        Arc::new(Self {
            role,
            directory,
            timing,
            gate,
            trigger_rx,
            settled: AtomicBool::new(false),
            tracked: Mutex::new(Vec::new()),
            attached: Mutex::new(None),
            passes: AtomicU64::new(0),
        })
    }

    pub fn role(&self) -> DiagnosticRole {
        self.role
    }

    /// True once a reconciliation has seen at least one monitor.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Completed reconciliation passes. Retry passes do not count.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Registers the diagnostic entity, subscribes to directory events,
    /// arms the first settling pass and spawns the worker and periodic
    /// recount tasks.
    pub fn start(
        self: &Arc<Self>,
        task_manager: &TaskManager,
        notify_shutdown: &broadcast::Sender<ShutdownMessage>,
        status_sender: StatusSender,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) {
        self.directory.register_diagnostic(self.role);

        // The listener captures only the gate, so nothing inside the
        // directory keeps the aggregator alive.
        let gate = Arc::clone(&self.gate);
        let debounce = self.timing.debounce;
        let listener_id = self.directory.subscribe(move |event| {
            let relevant = match event {
                DirectoryEvent::AvailabilityChanged { .. } => true,
                DirectoryEvent::Registered(id) | DirectoryEvent::Removed(id) => {
                    DiagnosticRole::of_entity_id(id).is_none()
                }
            };
            if relevant {
                gate.arm(debounce);
            }
        });

        // First pass runs after the settle delay.
        self.gate.arm(self.timing.settle);

        let aggregator = Arc::clone(self);
        let trigger_rx = self.trigger_rx.clone();
        let mut shutdown_rx = notify_shutdown.subscribe();
        let worker_shutdown_complete = shutdown_complete_tx.clone();
        task_manager.spawn(async move {
            let _shutdown_complete = worker_shutdown_complete;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(role = ?aggregator.role, "Diagnostics worker stopping");
                        break;
                    }
                    trigger = trigger_rx.recv() => {
                        match trigger {
                            Ok(()) => aggregator.reconcile(),
                            Err(_) => {
                                status_sender
                                    .report("diagnostics trigger channel closed".to_string())
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
            aggregator.directory.unsubscribe(listener_id);
        });

        let gate = Arc::clone(&self.gate);
        let debounce = self.timing.debounce;
        let periodic = self.timing.periodic;
        let mut shutdown_rx = notify_shutdown.subscribe();
        task_manager.spawn(async move {
            let _shutdown_complete = shutdown_complete_tx;
            let mut ticker = tokio::time::interval(periodic);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The settling pass covers startup; skip the immediate tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => gate.arm(debounce),
                }
            }
        });
    }

    /// One reconciliation pass over the directory's enabled monitors.
    ///
    /// While unsettled, an empty monitor set re-arms the gate with the
    /// settle delay instead of publishing a zero. The attachment is only
    /// recomputed when the tracked id set itself changes; availability
    /// flapping alone keeps the current representative.
    fn reconcile(&self) {
        let states = self.directory.monitor_states();
        if states.is_empty() && !self.settled.load(Ordering::Acquire) {
            debug!(role = ?self.role, "No monitors yet; retrying after the settle delay");
            self.gate.arm(self.timing.settle);
            return;
        }
        self.settled.store(true, Ordering::Release);

        let ids: Vec<String> = states.iter().map(|(id, _)| id.clone()).collect();
        let value = match self.role {
            DiagnosticRole::Total => ids.len() as u64,
            DiagnosticRole::Errors => states
                .iter()
                .filter(|(_, availability)| *availability == Some(false))
                .count() as u64,
        };

        let attached = {
            let mut tracked = self.tracked.lock().unwrap();
            let mut attached = self.attached.lock().unwrap();
            if *tracked != ids {
                *attached = states
                    .iter()
                    .find(|(_, availability)| *availability == Some(true))
                    .or_else(|| states.first())
                    .map(|(id, _)| id.clone());
                *tracked = ids.clone();
            }
            attached.clone()
        };

        if !self.directory.publish_diagnostic(self.role, value, ids, attached) {
            debug!(role = ?self.role, "Diagnostic entity missing; count not published");
        }
        self.passes.fetch_add(1, Ordering::AcqRel);
    }
}

/// One self-heal pass: recreate any missing diagnostic entity and arm its
/// gate so the count repopulates. Never creates diagnostics while no
/// monitor exists at all.
pub fn sweep_once(directory: &MonitorDirectory, aggregators: &[Arc<DiagnosticAggregator>]) {
    if !directory.has_monitors() {
        return;
    }
    for aggregator in aggregators {
        if directory.register_diagnostic(aggregator.role) {
            warn!(
                entity_id = aggregator.role.entity_id(),
                "Recreated a missing diagnostic entity"
            );
            aggregator.gate.arm(aggregator.timing.debounce);
        }
    }
}

/// Spawns the periodic self-heal sweep over all aggregators.
pub fn start_self_heal(
    directory: Arc<MonitorDirectory>,
    aggregators: Vec<Arc<DiagnosticAggregator>>,
    period: Duration,
    task_manager: &TaskManager,
    notify_shutdown: &broadcast::Sender<ShutdownMessage>,
) {
    let mut shutdown_rx = notify_shutdown.subscribe();
    task_manager.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => sweep_once(&directory, &aggregators),
            }
        }
    });
}
