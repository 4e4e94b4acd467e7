//! Helpers shared by the Jellywatch integration tests.
//!
//! Tests start a complete daemon against [`mock_backend::MockBackend`]
//! servers and observe it the way an operator would, through the monitoring
//! HTTP API.

pub mod mock_backend;
pub mod utils;

use std::net::SocketAddr;
use std::sync::OnceLock;

use jellywatch::config::{BackendConfig, DiagnosticsConfig, DisplayConfig, JellywatchConfig};
use jellywatch::Jellywatch;
use tracing_subscriber::EnvFilter;

/// Cache refresh interval for the monitoring server under test. Short, so
/// state changes surface within one polling attempt.
const MONITORING_CACHE_REFRESH_SECS: u64 = 1;

static TRACING: OnceLock<()> = OnceLock::new();

/// Initializes tracing once per test binary. `RUST_LOG` overrides the
/// default `info` level.
pub fn start_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// Backend entry pointing at a test server. Polling is off, so the only
/// fetches are the startup refresh and whatever the test asks for.
pub fn backend_config(name: &str, address: SocketAddr, api_key: &str) -> BackendConfig {
    BackendConfig::new(
        name.to_string(),
        address.ip().to_string(),
        address.port(),
        false,
        true,
        api_key.to_string(),
        0,
        true,
    )
}

/// Diagnostics timing tight enough for a test to wait out: one second to
/// settle and debounce, an unconditional recount every two.
pub fn fast_diagnostics() -> DiagnosticsConfig {
    DiagnosticsConfig {
        settle_secs: 1,
        debounce_secs: 1,
        periodic_secs: 2,
        self_heal_secs: 3600,
    }
}

/// Starts a full daemon over `backends` and waits until its monitoring API
/// answers. The daemon keeps running for the rest of the test process.
pub async fn start_jellywatch(backends: Vec<BackendConfig>) -> SocketAddr {
    let monitoring_address = utils::get_available_address();
    let config = JellywatchConfig::new(
        backends,
        DisplayConfig::default(),
        fast_diagnostics(),
        Some(monitoring_address),
        MONITORING_CACHE_REFRESH_SECS,
    );
    let daemon = Jellywatch::new(config);
    tokio::spawn(async move {
        if let Err(e) = daemon.start().await {
            panic!("Jellywatch failed to start: {e:?}");
        }
    });
    utils::wait_for_monitoring_api(monitoring_address).await;
    monitoring_address
}
