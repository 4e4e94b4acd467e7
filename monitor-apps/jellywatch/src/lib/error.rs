//! Error kinds surfaced by the daemon's startup and supervision paths.

use thiserror::Error;

/// Fatal error kinds reported by [`crate::Jellywatch::start`].
#[derive(Debug, Error)]
pub enum JellywatchErrorKind {
    /// The loaded configuration failed validation.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The monitoring HTTP server could not be brought up.
    #[error("Monitoring server error: {0}")]
    MonitoringServer(String),
}
