//! Shared building blocks for Jellywatch applications.
//!
//! This crate carries everything the monitor roles have in common:
//!
//! - **`backend`**: wire types and the HTTP client for Jellyfin-compatible
//!   media servers, plus the cached [`backend::Snapshot`].
//! - **`sessions`**: the pure aggregation engine that turns a raw session
//!   list into a sorted, rendered activity view.
//! - **`monitoring`**: the HTTP JSON API / Prometheus surface that exposes
//!   monitor state to operators.
//! - **`task_manager`**: bookkeeping for spawned tokio tasks so shutdown can
//!   abort and join them deterministically.

pub mod backend;
pub mod config_helpers;
pub mod monitoring;
pub mod sessions;
pub mod task_manager;

/// Capacity of the broadcast channel used to fan out shutdown messages.
///
/// Shutdown bursts are small (one message per subsystem transition), so a
/// modest buffer is enough to keep slow subscribers from missing the signal.
pub const SHUTDOWN_BROADCAST_CAPACITY: usize = 16;
