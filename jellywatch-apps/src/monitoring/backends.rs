//! Backend monitoring types
//!
//! These types describe the **backends** (remote media servers) an app is
//! polling. An app has one monitor per configured backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::sessions::{ActiveSession, SessionCounts};

/// One active playback session, flattened for the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    pub user: String,
    pub media_type: String,
    pub title: String,
    pub device: String,
    pub client: String,
    pub series: String,
    pub season: String,
    pub episode: String,
    pub artist: String,
    pub rating: String,
    pub quality: String,
    pub audio: String,
    pub position: String,
    pub runtime: String,
    pub percentage: u64,
    pub play_method: String,
    pub transcode_fps: String,
    pub transcode_percentage: String,
    pub transcode_reasons: String,
}

impl From<&ActiveSession> for SessionInfo {
    fn from(session: &ActiveSession) -> Self {
        SessionInfo {
            user: session.user.clone(),
            media_type: session.media_type.as_str().to_string(),
            title: session.title.clone(),
            device: session.device.clone(),
            client: session.client.clone(),
            series: session.series.clone(),
            season: session.season.clone(),
            episode: session.episode.clone(),
            artist: session.artist.clone(),
            rating: session.rating.clone(),
            quality: session.quality.clone(),
            audio: session.audio.clone(),
            position: session.position.clone(),
            runtime: session.runtime.clone(),
            percentage: session.percentage,
            play_method: session.play_method.clone(),
            transcode_fps: session.transcode_fps.clone(),
            transcode_percentage: session.transcode_percentage.clone(),
            transcode_reasons: session.transcode_reasons.clone(),
        }
    }
}

/// Per-type session tallies for the API.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionCountsInfo {
    pub active: u64,
    pub audio: u64,
    pub episode: u64,
    pub movie: u64,
}

impl From<SessionCounts> for SessionCountsInfo {
    fn from(counts: SessionCounts) -> Self {
        SessionCountsInfo {
            active: counts.active,
            audio: counts.audio,
            episode: counts.episode,
            movie: counts.movie,
        }
    }
}

/// Full status of one backend monitor
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackendStatusInfo {
    /// Display name from the configuration.
    pub name: String,
    /// Stable identifier derived from the name.
    pub slug: String,
    /// "Active" when at least one session is playing, else "Idle".
    pub state: String,
    /// Whether the most recent refresh succeeded.
    pub available: bool,
    pub polling_enabled: bool,
    pub server_version: Option<String>,
    /// RFC 3339 completion time of the last successful refresh.
    pub last_updated: Option<String>,
    /// Seconds since the last successful refresh.
    pub last_update_age_secs: Option<u64>,
    /// Message of the most recent fetch failure, cleared on success.
    pub last_error: Option<String>,
    /// Rendered activity summary (template lines or the idle message).
    pub summary: String,
    pub counts: SessionCountsInfo,
    pub library_counts: BTreeMap<String, u64>,
    pub sessions: Vec<SessionInfo>,
}

impl BackendStatusInfo {
    /// Lightweight listing entry - use the per-backend endpoints for the rest
    pub fn to_metadata(&self) -> BackendMetadata {
        BackendMetadata {
            name: self.name.clone(),
            slug: self.slug.clone(),
            state: self.state.clone(),
            available: self.available,
            active_sessions: self.counts.active,
        }
    }
}

/// Metadata-only view of a backend monitor
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BackendMetadata {
    pub name: String,
    pub slug: String,
    pub state: String,
    pub available: bool,
    pub active_sessions: u64,
}

/// Aggregate information across all backend monitors
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BackendsSummary {
    pub total: usize,
    pub available: usize,
    pub active_sessions: u64,
}

/// Trait for monitoring the set of backends
pub trait BackendsMonitoring: Send + Sync {
    /// Get the current status of every backend monitor
    fn get_backends(&self) -> Vec<BackendStatusInfo>;

    /// Get summary across all backends
    fn get_backends_summary(&self) -> BackendsSummary {
        let backends = self.get_backends();

        BackendsSummary {
            total: backends.len(),
            available: backends.iter().filter(|b| b.available).count(),
            active_sessions: backends.iter().map(|b| b.counts.active).sum(),
        }
    }
}

/// Trait for requesting an out-of-schedule refresh of one backend
pub trait ManualRefresh: Send + Sync {
    /// Returns false when no backend with that slug exists.
    fn request_refresh(&self, slug: &str) -> bool;
}
