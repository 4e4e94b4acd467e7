//! Talking to one media-server backend over HTTP(S).
//!
//! - **`wire`**: serde types for the backend's PascalCase JSON schema.
//! - **`client`**: the HTTP client issuing the two read calls (sessions,
//!   library counts) under a single time budget.
//! - **`snapshot`**: the last-good cached state a polling coordinator keeps
//!   between refreshes.

pub mod client;
pub mod snapshot;
pub mod wire;

pub use client::{
    BackendAddress, BackendClient, ConnectionDiagnosis, FetchError, FetchedState, FETCH_BUDGET,
};
pub use snapshot::Snapshot;
pub use wire::{
    LibraryCounts, MediaStream, NowPlayingItem, PlayState, RawSession, TranscodingInfo,
};
