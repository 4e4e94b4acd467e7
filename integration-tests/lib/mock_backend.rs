//! In-process stand-in for a Jellyfin-compatible media server.
//!
//! Serves the two endpoints a monitor fetches, guarded by the same
//! `api_key` query parameter a real server checks. Tests steer it through
//! the [`MockBackendHandle`]: swap the session list, inject faults, and
//! count how often the daemon actually called.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tracing::info;

/// How the mock answers its next requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer normally.
    None,
    /// Reject every request with 401, regardless of the key.
    Unauthorized,
    /// Answer 200 with a body that is not JSON.
    Malformed,
}

pub struct MockBackend {
    listening_address: SocketAddr,
    api_key: String,
}

struct MockBackendState {
    api_key: String,
    fault: Mutex<Fault>,
    sessions: Mutex<Value>,
    library_counts: Mutex<Value>,
    session_hits: AtomicU64,
    counts_hits: AtomicU64,
}

/// Control surface for a running [`MockBackend`].
#[derive(Clone)]
pub struct MockBackendHandle {
    state: Arc<MockBackendState>,
}

impl MockBackend {
    pub fn new(listening_address: SocketAddr, api_key: &str) -> Self {
        Self {
            listening_address,
            api_key: api_key.to_string(),
        }
    }

    pub async fn start(self) -> MockBackendHandle {
        let state = Arc::new(MockBackendState {
            api_key: self.api_key,
            fault: Mutex::new(Fault::None),
            sessions: Mutex::new(json!([])),
            library_counts: Mutex::new(json!({})),
            session_hits: AtomicU64::new(0),
            counts_hits: AtomicU64::new(0),
        });

        let router = Router::new()
            .route("/Sessions", get(handle_sessions))
            .route("/Items/Counts", get(handle_counts))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind(self.listening_address)
            .await
            .expect("Failed to bind the mock backend listener");
        info!("MockBackend: serving on {}", self.listening_address);

        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Mock backend server failed");
        });

        MockBackendHandle { state }
    }
}

impl MockBackendHandle {
    /// Replaces the session list served by `/Sessions`.
    pub fn set_sessions(&self, sessions: Value) {
        *self.state.sessions.lock().unwrap() = sessions;
    }

    /// Replaces the counts object served by `/Items/Counts`.
    pub fn set_library_counts(&self, counts: Value) {
        *self.state.library_counts.lock().unwrap() = counts;
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.state.fault.lock().unwrap() = fault;
    }

    /// Requests `/Sessions` has received, including rejected ones.
    pub fn session_hits(&self) -> u64 {
        self.state.session_hits.load(Ordering::Acquire)
    }

    /// Requests `/Items/Counts` has received, including rejected ones.
    pub fn counts_hits(&self) -> u64 {
        self.state.counts_hits.load(Ordering::Acquire)
    }
}

/// Fault and key check shared by both endpoints. `None` means the request
/// may be answered normally.
fn reject(state: &MockBackendState, params: &HashMap<String, String>) -> Option<Response> {
    match *state.fault.lock().unwrap() {
        Fault::Unauthorized => {
            info!("MockBackend: rejecting request (forced 401)");
            return Some(StatusCode::UNAUTHORIZED.into_response());
        }
        Fault::Malformed => {
            info!("MockBackend: answering with a malformed body");
            return Some((StatusCode::OK, "not json").into_response());
        }
        Fault::None => {}
    }
    if params.get("api_key").map(String::as_str) != Some(state.api_key.as_str()) {
        info!("MockBackend: rejecting request with a wrong or missing api_key");
        return Some(StatusCode::UNAUTHORIZED.into_response());
    }
    None
}

async fn handle_sessions(
    State(state): State<Arc<MockBackendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.session_hits.fetch_add(1, Ordering::AcqRel);
    if let Some(response) = reject(&state, &params) {
        return response;
    }
    let sessions = state.sessions.lock().unwrap().clone();
    info!("MockBackend: serving /Sessions");
    Json(sessions).into_response()
}

async fn handle_counts(
    State(state): State<Arc<MockBackendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.counts_hits.fetch_add(1, Ordering::AcqRel);
    if let Some(response) = reject(&state, &params) {
        return response;
    }
    let counts = state.library_counts.lock().unwrap().clone();
    info!("MockBackend: serving /Items/Counts");
    Json(counts).into_response()
}

/// A playing movie session for `user`, in the server's wire schema.
pub fn playing_movie(user: &str, title: &str) -> Value {
    json!({
        "UserName": user,
        "Client": "WebPlayer",
        "DeviceName": "Living Room TV",
        "ApplicationVersion": "10.9.2",
        "PlaybackState": "Playing",
        "PlayState": {
            "PositionTicks": 9_000_000_000u64,
            "IsPaused": false,
            "PlayMethod": "DirectPlay"
        },
        "NowPlayingItem": {
            "Name": title,
            "Type": "Movie",
            "RunTimeTicks": 72_000_000_000u64,
            "MediaStreams": [
                {"Type": "Video", "Codec": "h264", "Width": 1920, "Height": 1080},
                {"Type": "Audio", "Codec": "aac", "Channels": 2}
            ]
        }
    })
}

/// A playing episode session, complete with series facts.
pub fn playing_episode(user: &str, series: &str, title: &str) -> Value {
    json!({
        "UserName": user,
        "Client": "AndroidTV",
        "DeviceName": "Bedroom",
        "ApplicationVersion": "10.9.2",
        "PlaybackState": "Playing",
        "PlayState": {
            "PositionTicks": 3_000_000_000u64,
            "IsPaused": false,
            "PlayMethod": "DirectPlay"
        },
        "NowPlayingItem": {
            "Name": title,
            "Type": "Episode",
            "SeriesName": series,
            "ParentIndexNumber": 1,
            "IndexNumber": 4,
            "RunTimeTicks": 27_000_000_000u64
        }
    })
}

/// A connected client with nothing playing. Never counts as active.
pub fn idle_session(user: &str) -> Value {
    json!({
        "UserName": user,
        "Client": "WebPlayer",
        "DeviceName": "Office",
        "ApplicationVersion": "10.9.2"
    })
}
