//! Axum server for the monitoring API.
//!
//! One router serves the versioned JSON API, the Swagger UI and the
//! Prometheus text endpoint, all reading through the [`SnapshotCache`].

use super::{
    backends::{
        BackendMetadata, BackendStatusInfo, BackendsMonitoring, BackendsSummary, ManualRefresh,
        SessionCountsInfo, SessionInfo,
    },
    diagnostics::{DiagnosticsInfo, DiagnosticsMonitoring},
    prometheus_metrics::PrometheusMetrics,
    snapshot_cache::SnapshotCache,
    GlobalInfo,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::{
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Jellywatch Monitoring API",
        version = "0.1.0",
        description = "HTTP JSON API for monitoring media-server backends"
    ),
    paths(
        handle_health,
        handle_global,
        handle_backends,
        handle_backend_by_slug,
        handle_backend_sessions,
        handle_refresh_backend,
        handle_diagnostics,
    ),
    components(schemas(
        GlobalInfo,
        BackendsSummary,
        BackendStatusInfo,
        BackendMetadata,
        SessionInfo,
        SessionCountsInfo,
        DiagnosticsInfo,
        HealthResponse,
        ErrorResponse,
        BackendsResponse,
        BackendSessionsResponse,
        RefreshResponse,
    )),
    tags(
        (name = "health", description = "Liveness probe"),
        (name = "global", description = "Fleet-wide statistics"),
        (name = "backends", description = "Per-backend monitoring"),
        (name = "diagnostics", description = "Cross-backend diagnostic aggregator")
    )
)]
struct ApiDoc;

/// State shared by every handler.
#[derive(Clone)]
struct ServerState {
    cache: Arc<SnapshotCache>,
    start_time: u64,
    metrics: PrometheusMetrics,
    refresher: Option<Arc<dyn ManualRefresh + Send + Sync>>,
}

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 100;

#[derive(Deserialize, IntoParams)]
struct Pagination {
    /// Items to skip (default: 0)
    #[serde(default)]
    offset: usize,
    /// Page size (default: 25, capped at 100)
    #[serde(default)]
    limit: Option<usize>,
}

impl Pagination {
    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

fn paginate<T: Clone>(items: &[T], params: &Pagination) -> (usize, Vec<T>) {
    let total = items.len();
    let start = params.offset.min(total);
    let end = (start + params.effective_limit()).min(total);
    (total, items[start..end].to_vec())
}

/// The monitoring API server.
pub struct MonitoringServer {
    bind_address: SocketAddr,
    state: ServerState,
    refresh_interval: Duration,
}

impl MonitoringServer {
    /// Build the server and its snapshot cache.
    ///
    /// Handlers read from a cached copy of the monitoring data that a
    /// background task refreshes every `refresh_interval`, so request
    /// traffic never contends with refresh cycles or the diagnostic
    /// aggregators. A source passed as `None` leaves the matching
    /// endpoints answering 404.
    pub fn new(
        bind_address: SocketAddr,
        backends_source: Option<Arc<dyn BackendsMonitoring + Send + Sync + 'static>>,
        diagnostics_source: Option<Arc<dyn DiagnosticsMonitoring + Send + Sync + 'static>>,
        refresh_interval: Duration,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let has_backends = backends_source.is_some();
        let has_diagnostics = diagnostics_source.is_some();

        let cache = Arc::new(SnapshotCache::new(
            refresh_interval,
            backends_source,
            diagnostics_source,
        ));
        // Fill the cache before the first request can hit it.
        cache.refresh();

        let metrics = PrometheusMetrics::new(has_backends, has_diagnostics)?;

        Ok(Self {
            bind_address,
            refresh_interval,
            state: ServerState {
                cache,
                start_time,
                metrics,
                refresher: None,
            },
        })
    }

    /// Wire up the manual refresh action (optional)
    ///
    /// This must be called before `run()` if you want the refresh endpoint.
    pub fn with_manual_refresh(
        mut self,
        refresher: Arc<dyn ManualRefresh + Send + Sync + 'static>,
    ) -> Self {
        self.state.refresher = Some(refresher);
        self
    }

    /// Serve until `shutdown_signal` completes.
    ///
    /// Runs the HTTP server and the cache refresher together; both stop
    /// when the signal fires. Besides the JSON API this exposes the
    /// Swagger UI, the OpenAPI document and the Prometheus text format.
    pub async fn run(
        self,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Starting monitoring API on http://{}", self.bind_address);
        info!("Snapshot cache refreshes every {:?}", self.refresh_interval);

        // Keep the cache fresh in the background.
        let cache_for_refresh = self.state.cache.clone();
        let refresh_interval = self.refresh_interval;
        let refresh_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            loop {
                interval.tick().await;
                cache_for_refresh.refresh();
            }
        });

        // JSON API, versioned under /api/v1.
        let api_v1 = Router::new()
            .route("/health", get(handle_health))
            .route("/global", get(handle_global))
            .route("/backends", get(handle_backends))
            .route("/backends/{slug}", get(handle_backend_by_slug))
            .route("/backends/{slug}/sessions", get(handle_backend_sessions))
            .route("/backends/{slug}/refresh", post(handle_refresh_backend))
            .route("/diagnostics", get(handle_diagnostics));

        let app = Router::new()
            .route("/", get(handle_root))
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .nest("/api/v1", api_v1)
            .route("/metrics", get(handle_prometheus_metrics))
            .with_state(self.state);

        let listener = TcpListener::bind(self.bind_address).await?;

        info!("Swagger UI at http://{}/swagger-ui", self.bind_address);
        info!(
            "Prometheus scrape endpoint at http://{}/metrics",
            self.bind_address
        );

        let server_handle = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown_signal.await;
            info!("Monitoring API shutting down");
        });

        let result = server_handle.await;

        // The refresher dies with the server.
        refresh_handle.abort();

        info!("Monitoring API stopped");
        result.map_err(|e| e.into())
    }
}

// Response envelopes, doubling as the OpenAPI schemas.
#[derive(serde::Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: u64,
}

#[derive(serde::Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize, ToSchema)]
struct BackendsResponse {
    offset: usize,
    limit: usize,
    total: usize,
    items: Vec<BackendMetadata>,
}

#[derive(serde::Serialize, ToSchema)]
struct BackendSessionsResponse {
    backend: String,
    offset: usize,
    limit: usize,
    total: usize,
    items: Vec<SessionInfo>,
}

#[derive(serde::Serialize, ToSchema)]
struct RefreshResponse {
    backend: String,
    status: String,
}

/// Root endpoint, an index of everything the server exposes.
async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "Jellywatch Monitoring API",
        "version": "0.1.0",
        "endpoints": {
            "/": "API index",
            "/swagger-ui": "Interactive API documentation",
            "/api-docs/openapi.json": "OpenAPI specification",
            "/api/v1/health": "Liveness probe",
            "/api/v1/global": "Fleet-wide statistics",
            "/api/v1/backends": "All backend monitors (paginated)",
            "/api/v1/backends/{slug}": "Single backend status",
            "/api/v1/backends/{slug}/sessions": "Active sessions on a backend (paginated)",
            "/api/v1/backends/{slug}/refresh": "POST - request an immediate refresh",
            "/api/v1/diagnostics": "Diagnostic aggregator state",
            "/metrics": "Prometheus metrics"
        }
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    })
}

/// Fleet-wide statistics.
#[utoipa::path(
    get,
    path = "/api/v1/global",
    tag = "global",
    responses(
        (status = 200, description = "Fleet-wide statistics", body = GlobalInfo)
    )
)]
async fn handle_global(State(state): State<ServerState>) -> Json<GlobalInfo> {
    let uptime_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        - state.start_time;

    let snapshot = state.cache.get_snapshot();

    let backends = snapshot.backends_summary.unwrap_or_default();

    Json(GlobalInfo {
        backends,
        uptime_secs,
    })
}

/// Get all backend monitors - returns metadata only, use /backends/{slug} for details
#[utoipa::path(
    get,
    path = "/api/v1/backends",
    tag = "backends",
    params(Pagination),
    responses(
        (status = 200, description = "List of backends (metadata only)", body = BackendsResponse),
        (status = 404, description = "Backend monitoring not available", body = ErrorResponse)
    )
)]
async fn handle_backends(
    Query(params): Query<Pagination>,
    State(state): State<ServerState>,
) -> Response {
    let snapshot = state.cache.get_snapshot();

    match snapshot.backends {
        Some(ref backends) => {
            let metadata: Vec<BackendMetadata> =
                backends.iter().map(|b| b.to_metadata()).collect();
            let (total, items) = paginate(&metadata, &params);

            Json(BackendsResponse {
                offset: params.offset,
                limit: params.effective_limit(),
                total,
                items,
            })
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Backend monitoring not available".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Get a single backend's full status by slug
#[utoipa::path(
    get,
    path = "/api/v1/backends/{slug}",
    tag = "backends",
    params(
        ("slug" = String, Path, description = "Backend slug")
    ),
    responses(
        (status = 200, description = "Backend status", body = BackendStatusInfo),
        (status = 404, description = "Backend not found", body = ErrorResponse)
    )
)]
async fn handle_backend_by_slug(
    Path(slug): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    let snapshot = state.cache.get_snapshot();

    let backends = match snapshot.backends {
        Some(ref backends) => backends,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Backend monitoring not available".to_string(),
                }),
            )
                .into_response();
        }
    };

    match backends.iter().find(|b| b.slug == slug) {
        Some(backend) => Json(backend.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Backend {} not found", slug),
            }),
        )
            .into_response(),
    }
}

/// Get active sessions for a specific backend (paginated)
#[utoipa::path(
    get,
    path = "/api/v1/backends/{slug}/sessions",
    tag = "backends",
    params(
        ("slug" = String, Path, description = "Backend slug"),
        Pagination
    ),
    responses(
        (status = 200, description = "Active sessions (paginated)", body = BackendSessionsResponse),
        (status = 404, description = "Backend not found", body = ErrorResponse)
    )
)]
async fn handle_backend_sessions(
    Path(slug): Path<String>,
    Query(params): Query<Pagination>,
    State(state): State<ServerState>,
) -> Response {
    let snapshot = state.cache.get_snapshot();

    let backends = match snapshot.backends {
        Some(ref backends) => backends,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Backend monitoring not available".to_string(),
                }),
            )
                .into_response();
        }
    };

    match backends.iter().find(|b| b.slug == slug) {
        Some(backend) => {
            let (total, items) = paginate(&backend.sessions, &params);

            Json(BackendSessionsResponse {
                backend: slug,
                offset: params.offset,
                limit: params.effective_limit(),
                total,
                items,
            })
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Backend {} not found", slug),
            }),
        )
            .into_response(),
    }
}

/// Request an immediate out-of-schedule refresh of one backend
#[utoipa::path(
    post,
    path = "/api/v1/backends/{slug}/refresh",
    tag = "backends",
    params(
        ("slug" = String, Path, description = "Backend slug")
    ),
    responses(
        (status = 202, description = "Refresh scheduled", body = RefreshResponse),
        (status = 404, description = "Backend not found or manual refresh not available", body = ErrorResponse)
    )
)]
async fn handle_refresh_backend(
    Path(slug): Path<String>,
    State(state): State<ServerState>,
) -> Response {
    let refresher = match state.refresher {
        Some(ref refresher) => refresher,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Manual refresh not available".to_string(),
                }),
            )
                .into_response();
        }
    };

    if refresher.request_refresh(&slug) {
        (
            StatusCode::ACCEPTED,
            Json(RefreshResponse {
                backend: slug,
                status: "scheduled".to_string(),
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Backend {} not found", slug),
            }),
        )
            .into_response()
    }
}

/// Get the diagnostic aggregator's current state
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    tag = "diagnostics",
    responses(
        (status = 200, description = "Diagnostic aggregator state", body = DiagnosticsInfo),
        (status = 404, description = "Diagnostics not available", body = ErrorResponse)
    )
)]
async fn handle_diagnostics(State(state): State<ServerState>) -> Response {
    let snapshot = state.cache.get_snapshot();

    match snapshot.diagnostics {
        Some(diagnostics) => Json(diagnostics).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Diagnostics not available".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Prometheus text endpoint. Gauges are repopulated from the snapshot on
/// every scrape.
async fn handle_prometheus_metrics(State(state): State<ServerState>) -> Response {
    let snapshot = state.cache.get_snapshot();

    let uptime_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        - state.start_time;
    state.metrics.uptime_seconds.set(uptime_secs as f64);

    // Reset per-backend metrics before repopulating, so monitors that
    // disappeared stop being reported
    if let Some(ref metric) = state.metrics.backend_up {
        metric.reset();
    }
    if let Some(ref metric) = state.metrics.backend_active_sessions {
        metric.reset();
    }
    if let Some(ref metric) = state.metrics.backend_sessions_by_type {
        metric.reset();
    }
    if let Some(ref metric) = state.metrics.backend_snapshot_age_seconds {
        metric.reset();
    }
    if let Some(ref metric) = state.metrics.backend_library_items {
        metric.reset();
    }

    for backend in snapshot.backends.as_deref().unwrap_or(&[]) {
        let slug = backend.slug.as_str();

        if let Some(ref metric) = state.metrics.backend_up {
            metric
                .with_label_values(&[slug])
                .set(if backend.available { 1.0 } else { 0.0 });
        }
        if let Some(ref metric) = state.metrics.backend_active_sessions {
            metric
                .with_label_values(&[slug])
                .set(backend.counts.active as f64);
        }
        if let Some(ref metric) = state.metrics.backend_sessions_by_type {
            metric
                .with_label_values(&[slug, "audio"])
                .set(backend.counts.audio as f64);
            metric
                .with_label_values(&[slug, "episode"])
                .set(backend.counts.episode as f64);
            metric
                .with_label_values(&[slug, "movie"])
                .set(backend.counts.movie as f64);
        }
        if let (Some(ref metric), Some(age)) = (
            &state.metrics.backend_snapshot_age_seconds,
            backend.last_update_age_secs,
        ) {
            metric.with_label_values(&[slug]).set(age as f64);
        }
        if let Some(ref metric) = state.metrics.backend_library_items {
            for (kind, count) in &backend.library_counts {
                metric.with_label_values(&[slug, kind]).set(*count as f64);
            }
        }
    }

    if let Some(ref diagnostics) = snapshot.diagnostics {
        if let Some(ref metric) = state.metrics.backends_total {
            metric.set(diagnostics.total_backends as f64);
        }
        if let Some(ref metric) = state.metrics.backends_unavailable {
            metric.set(diagnostics.unavailable_backends as f64);
        }
    }

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("metrics were not valid UTF-8: {}", e),
                }),
            )
                .into_response(),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("failed to encode metrics: {}", e),
            }),
        )
            .into_response(),
    }
}
