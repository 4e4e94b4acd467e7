//! Last-good cached state for one backend.

use chrono::{DateTime, Duration, Utc};

use super::wire::{LibraryCounts, RawSession};

/// The result of the most recent successful poll of one backend.
///
/// A polling coordinator replaces its snapshot wholesale after a successful
/// fetch and leaves it untouched on failure, so consumers keep seeing the
/// last good data across outages.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub sessions: Vec<RawSession>,
    pub library_counts: LibraryCounts,
    /// Sticky: an advancing refresh keeps the previous value when no session
    /// in the new list reports a server version.
    pub server_version: Option<String>,
    /// Completion time of the refresh that produced this snapshot. Never
    /// moves backwards.
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Builds the successor snapshot after a successful fetch.
    pub fn advance(
        &self,
        sessions: Vec<RawSession>,
        library_counts: LibraryCounts,
        fetched_at: DateTime<Utc>,
    ) -> Snapshot {
        let server_version = sessions
            .iter()
            .find_map(|session| session.application_version.clone())
            .or_else(|| self.server_version.clone());
        let last_updated_at = match self.last_updated_at {
            Some(previous) if previous > fetched_at => Some(previous),
            _ => Some(fetched_at),
        };
        Snapshot {
            sessions,
            library_counts,
            server_version,
            last_updated_at,
        }
    }

    /// Whether any refresh ever succeeded.
    pub fn is_populated(&self) -> bool {
        self.last_updated_at.is_some()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_updated_at.map(|at| now - at)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_updated_at {
            None => true,
            Some(at) => now - at > max_age,
        }
    }
}
