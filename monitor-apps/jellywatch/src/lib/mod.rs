//! ## Jellywatch
//!
//! Provides the core logic and main struct (`Jellywatch`) for running a
//! media-server session monitoring daemon.
//!
//! This module orchestrates the per-backend polling monitors, the directory
//! they publish into and the cross-backend diagnostic aggregators.
//!
//! The central component is the `Jellywatch` struct, which encapsulates the
//! state and provides the `start` method as the main entry point for running
//! the daemon. It relies on several sub-modules (`config`, `coordinator`,
//! `directory`, `diagnostics`, `status`, etc.) for specialized
//! functionalities.
use std::sync::{Arc, OnceLock};

use jellywatch_apps::{
    backend::Snapshot, sessions::render, task_manager::TaskManager, SHUTDOWN_BROADCAST_CAPACITY,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    config::JellywatchConfig,
    coordinator::{BackendMonitor, MonitorEvent},
    diagnostics::{start_self_heal, DiagnosticAggregator, DiagnosticsTiming},
    directory::{DiagnosticRole, MonitorDirectory},
    error::JellywatchErrorKind,
    monitoring::{DiagnosticsHandle, RefreshHandle},
    status::{State, Status, StatusSender},
    utils::ShutdownMessage,
};

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod directory;
pub mod error;
mod monitoring;
pub mod status;
pub mod utils;

/// The main struct that manages the session monitoring daemon.
#[derive(Clone, Debug)]
pub struct Jellywatch {
    config: JellywatchConfig,
    notify_shutdown: broadcast::Sender<ShutdownMessage>,
}

impl Jellywatch {
    /// Creates a new `Jellywatch`.
    ///
    /// Initializes the daemon with the given configuration and sets up the
    /// shutdown broadcast channel.
    pub fn new(config: JellywatchConfig) -> Self {
        let (notify_shutdown, _) =
            broadcast::channel::<ShutdownMessage>(SHUTDOWN_BROADCAST_CAPACITY);
        Self {
            config,
            notify_shutdown,
        }
    }

    /// Starts the daemon.
    ///
    /// This method starts the main event loop, which sets up the backend
    /// monitors, the diagnostic aggregators, the optional monitoring server
    /// and status reporting.
    pub async fn start(&self) -> Result<(), JellywatchErrorKind> {
        info!("Starting Jellywatch...");
        self.config.validate()?;
        // Several daemons can share a test process, so a second `start`
        // keeps the first flag value instead of panicking.
        if DEBUG_DISPLAY.set(self.config.display.debug).is_err() {
            debug!("Debug display flag already initialized; keeping the first value");
        }

        let notify_shutdown = self.notify_shutdown.clone();
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);
        let task_manager = Arc::new(TaskManager::new());
        let (status_sender, status_receiver) = async_channel::unbounded::<Status>();
        let (refresh_sender, refresh_receiver) = async_channel::unbounded::<String>();
        let directory = Arc::new(MonitorDirectory::new());

        debug!("All inter-subsystem channels initialized");

        info!("Initializing backend monitors...");
        for backend in &self.config.backends {
            let monitor = match BackendMonitor::new(backend) {
                Ok(monitor) => Arc::new(monitor),
                Err(e) => {
                    error!(backend = %backend.name, "Could not construct the backend client: {e}");
                    return Err(JellywatchErrorKind::Configuration(e.to_string()));
                }
            };
            let initial = render(
                &Snapshot::default(),
                &self.config.display.session_template,
                &self.config.display.idle_message,
            );
            directory.register_monitor(monitor.clone(), initial);

            if !monitor.enabled() {
                info!(
                    backend = %monitor.name(),
                    "Backend is disabled; registered without polling"
                );
                continue;
            }

            let observer_directory = directory.clone();
            let entity_id = monitor.entity_id();
            let session_template = self.config.display.session_template.clone();
            let idle_message = self.config.display.idle_message.clone();
            monitor.add_observer(move |event| match event {
                MonitorEvent::SnapshotUpdated(snapshot) => {
                    let rendered = render(snapshot, &session_template, &idle_message);
                    if debug_display() {
                        debug!(%entity_id, "{}", rendered.summary);
                    }
                    observer_directory.publish_view(&entity_id, rendered);
                }
                MonitorEvent::AvailabilityChanged { available } => {
                    observer_directory.publish_availability(&entity_id, *available);
                }
            });

            // The first refresh runs before polling starts, so consumers see
            // real data (or a recorded failure) from the beginning.
            if let Err(e) = monitor.refresh().await {
                warn!(
                    backend = %monitor.name(),
                    category = e.diagnosis().as_str(),
                    "Initial refresh failed: {e}"
                );
            }
            monitor.start_polling(&task_manager, notify_shutdown.subscribe());
        }

        let refresh_directory = directory.clone();
        let mut refresh_shutdown_rx = notify_shutdown.subscribe();
        let refresh_shutdown_complete = shutdown_complete_tx.clone();
        task_manager.spawn(async move {
            let _shutdown_complete = refresh_shutdown_complete;
            loop {
                tokio::select! {
                    _ = refresh_shutdown_rx.recv() => {
                        debug!("Manual refresh listener stopping");
                        break;
                    }
                    request = refresh_receiver.recv() => {
                        let Ok(slug) = request else { break };
                        let Some(monitor) = refresh_directory.monitor_by_slug(&slug) else {
                            debug!(%slug, "Manual refresh for an unknown backend dropped");
                            continue;
                        };
                        info!(backend = %monitor.name(), "Manual refresh requested");
                        if let Err(e) = monitor.refresh().await {
                            warn!(backend = %monitor.name(), "Manual refresh failed: {e}");
                        }
                    }
                }
            }
        });

        info!("Starting diagnostic aggregators...");
        let timing = DiagnosticsTiming {
            settle: self.config.diagnostics.settle(),
            debounce: self.config.diagnostics.debounce(),
            periodic: self.config.diagnostics.periodic(),
            self_heal: self.config.diagnostics.self_heal(),
        };
        let total = DiagnosticAggregator::new(DiagnosticRole::Total, directory.clone(), timing);
        let errors = DiagnosticAggregator::new(DiagnosticRole::Errors, directory.clone(), timing);
        total.start(
            &task_manager,
            &notify_shutdown,
            StatusSender::Diagnostics(status_sender.clone()),
            shutdown_complete_tx.clone(),
        );
        errors.start(
            &task_manager,
            &notify_shutdown,
            StatusSender::Diagnostics(status_sender.clone()),
            shutdown_complete_tx.clone(),
        );
        start_self_heal(
            directory.clone(),
            vec![total.clone(), errors.clone()],
            timing.self_heal,
            &task_manager,
            &notify_shutdown,
        );

        // Start monitoring server if configured
        if let Some(monitoring_addr) = self.config.monitoring_address() {
            info!(
                "Initializing monitoring server on http://{}",
                monitoring_addr
            );

            let diagnostics_source = Arc::new(DiagnosticsHandle::new(
                directory.clone(),
                total.clone(),
                errors.clone(),
            ));
            let refresher = Arc::new(RefreshHandle::new(directory.clone(), refresh_sender.clone()));

            let monitoring_server = jellywatch_apps::monitoring::MonitoringServer::new(
                monitoring_addr,
                Some(directory.clone()),
                Some(diagnostics_source),
                std::time::Duration::from_secs(self.config.monitoring_cache_refresh_secs()),
            )
            .map_err(|e| JellywatchErrorKind::MonitoringServer(e.to_string()))?
            .with_manual_refresh(refresher);

            // Create shutdown signal that waits for ShutdownAll
            let mut notify_shutdown_monitoring = notify_shutdown.subscribe();
            let shutdown_signal = async move {
                loop {
                    match notify_shutdown_monitoring.recv().await {
                        Ok(ShutdownMessage::ShutdownAll) => break,
                        Err(_) => break,
                    }
                }
            };

            let monitoring_status_sender = StatusSender::MonitoringServer(status_sender.clone());
            task_manager.spawn(async move {
                if let Err(e) = monitoring_server.run(shutdown_signal).await {
                    error!("Monitoring server error: {e:?}");
                    monitoring_status_sender.report(e.to_string()).await;
                }
            });
        }

        info!("Spawning status listener task...");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received — initiating graceful shutdown...");
                    let _ = notify_shutdown.send(ShutdownMessage::ShutdownAll);
                    break;
                }
                message = status_receiver.recv() => {
                    if let Ok(status) = message {
                        match status.state {
                            State::DiagnosticsShutdown(reason) => {
                                warn!("Diagnostics worker stopped: {reason}");
                            }
                            State::MonitoringServerShutdown(_) => {
                                warn!("Monitoring server shutdown requested — initiating full shutdown.");
                                let _ = notify_shutdown.send(ShutdownMessage::ShutdownAll);
                                break;
                            }
                        }
                    }
                }
            }
        }

        drop(shutdown_complete_tx);
        info!("Waiting for shutdown completion signals from subsystems...");
        let shutdown_timeout = tokio::time::Duration::from_secs(5);
        tokio::select! {
            _ = shutdown_complete_rx.recv() => {
                info!("All subsystems reported shutdown complete.");
            }
            _ = tokio::time::sleep(shutdown_timeout) => {
                warn!("Graceful shutdown timed out after {shutdown_timeout:?} — forcing shutdown.");
                task_manager.abort_all().await;
            }
        }
        info!("Joining remaining tasks...");
        task_manager.join_all().await;
        info!("Jellywatch shutdown complete.");
        Ok(())
    }
}

impl Drop for Jellywatch {
    fn drop(&mut self) {
        info!("Jellywatch dropped");
        let _ = self.notify_shutdown.send(ShutdownMessage::ShutdownAll);
    }
}

static DEBUG_DISPLAY: OnceLock<bool> = OnceLock::new();

#[cfg(not(test))]
pub fn debug_display() -> bool {
    *DEBUG_DISPLAY.get().expect("DEBUG_DISPLAY has to exist")
}

// We don't initialize `DEBUG_DISPLAY` in unit tests, so any test that
// reaches it would panic on the unset flag. This `cfg` wrapper provides
// a default value instead.
#[cfg(test)]
pub fn debug_display() -> bool {
    *DEBUG_DISPLAY.get_or_init(|| false)
}
