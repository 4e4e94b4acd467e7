//! Status reporting from subsystem tasks back to the daemon's main loop.
//!
//! Long-lived tasks hold a [`StatusSender`] naming the subsystem they run in.
//! When a task stops unexpectedly it reports a [`State`] describing what went
//! down, and the main loop decides whether the daemon keeps running.

use async_channel::Sender;
use tracing::error;

/// What a subsystem reports when it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// The diagnostics worker stopped. Session monitoring keeps running.
    DiagnosticsShutdown(String),
    /// The monitoring HTTP server stopped. Treated as fatal.
    MonitoringServerShutdown(String),
}

/// A status update delivered to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: State,
}

/// Identifies the subsystem a report comes from and carries the channel back
/// to the main loop.
#[derive(Debug, Clone)]
pub enum StatusSender {
    Diagnostics(Sender<Status>),
    MonitoringServer(Sender<Status>),
}

impl StatusSender {
    /// Reports that the owning subsystem stopped, with a human-readable
    /// reason. Dropped silently if the main loop is already gone.
    pub async fn report(&self, reason: String) {
        let (sender, state) = match self {
            Self::Diagnostics(tx) => (tx, State::DiagnosticsShutdown(reason)),
            Self::MonitoringServer(tx) => (tx, State::MonitoringServerShutdown(reason)),
        };
        if sender.send(Status { state }).await.is_err() {
            error!("Status channel closed before a subsystem could report its shutdown");
        }
    }
}
