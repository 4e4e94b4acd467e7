//! ## Jellywatch Configuration Module
//!
//! Defines [`JellywatchConfig`], the primary configuration structure for the
//! daemon.
//!
//! This module handles:
//! - Per-backend connection settings and poll cadence ([`BackendConfig`])
//! - Session line rendering and idle text ([`DisplayConfig`])
//! - Timing knobs for the fleet diagnostics ([`DiagnosticsConfig`])
//! - The optional monitoring HTTP server bind address
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jellywatch_apps::backend::BackendAddress;
use jellywatch_apps::config_helpers::opt_path_from_toml;
use jellywatch_apps::sessions::template;
use serde::Deserialize;
use tracing::warn;

use crate::error::JellywatchErrorKind;
use crate::utils::slugify;

/// Poll cadences a backend may be configured with, in seconds. `0` turns
/// background polling off for that backend.
pub const SCAN_INTERVAL_CHOICES: &[u64] = &[0, 10, 15, 30, 60, 120];

/// Configuration for the Jellywatch daemon.
#[derive(Debug, Deserialize, Clone)]
pub struct JellywatchConfig {
    /// Monitored media-server backends.
    pub backends: Vec<BackendConfig>,
    /// How active sessions are rendered into summary text.
    #[serde(default)]
    pub display: DisplayConfig,
    /// Timing for the fleet-wide diagnostic counters.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// The path to the log file for the daemon.
    #[serde(default, deserialize_with = "opt_path_from_toml")]
    log_file: Option<PathBuf>,
    /// Optional monitoring server bind address
    #[serde(default)]
    monitoring_address: Option<SocketAddr>,
    #[serde(default = "default_monitoring_cache_refresh_secs")]
    monitoring_cache_refresh_secs: u64,
}

fn default_monitoring_cache_refresh_secs() -> u64 {
    15
}

impl JellywatchConfig {
    /// Creates a new `JellywatchConfig` from parts. File loading goes
    /// through `ext-config` in `main`; this exists for tests and embedding.
    pub fn new(
        backends: Vec<BackendConfig>,
        display: DisplayConfig,
        diagnostics: DiagnosticsConfig,
        monitoring_address: Option<SocketAddr>,
        monitoring_cache_refresh_secs: u64,
    ) -> Self {
        Self {
            backends,
            display,
            diagnostics,
            log_file: None,
            monitoring_address,
            monitoring_cache_refresh_secs,
        }
    }

    /// Checks the loaded configuration before any backend is contacted.
    ///
    /// Rejects an empty backend list, duplicate names (case-insensitive),
    /// names whose identifiers collide after normalization, empty API keys
    /// and unsupported poll cadences. Unknown `session_template` keys only
    /// warn; rendering degrades per line instead of failing the daemon.
    pub fn validate(&self) -> Result<(), JellywatchErrorKind> {
        if self.backends.is_empty() {
            return Err(JellywatchErrorKind::Configuration(
                "at least one [[backends]] entry is required".to_string(),
            ));
        }
        let mut seen_names = HashSet::new();
        let mut seen_slugs: HashMap<String, String> = HashMap::new();
        for backend in &self.backends {
            if backend.api_key.is_empty() {
                return Err(JellywatchErrorKind::Configuration(format!(
                    "backend \"{}\": api_key must not be empty",
                    backend.name
                )));
            }
            if !SCAN_INTERVAL_CHOICES.contains(&backend.scan_interval_secs) {
                return Err(JellywatchErrorKind::Configuration(format!(
                    "backend \"{}\": scan_interval_secs must be one of {:?}",
                    backend.name, SCAN_INTERVAL_CHOICES
                )));
            }
            if !seen_names.insert(backend.name.to_lowercase()) {
                return Err(JellywatchErrorKind::Configuration(format!(
                    "duplicate backend name \"{}\"",
                    backend.name
                )));
            }
            let slug = backend.slug();
            if slug.is_empty() {
                return Err(JellywatchErrorKind::Configuration(format!(
                    "backend name \"{}\" leaves no usable identifier",
                    backend.name
                )));
            }
            if let Some(other) = seen_slugs.insert(slug.clone(), backend.name.clone()) {
                return Err(JellywatchErrorKind::Configuration(format!(
                    "backend names \"{other}\" and \"{}\" collide on identifier \"{slug}\"",
                    backend.name
                )));
            }
        }
        for key in template::placeholder_keys(&self.display.session_template) {
            if !template::TEMPLATE_KEYS.contains(&key.as_str()) {
                warn!(
                    "session_template references unknown key \"{key}\"; \
                     lines will render a diagnostic instead"
                );
            }
        }
        Ok(())
    }

    /// Returns the monitoring server bind address (if enabled)
    pub fn monitoring_address(&self) -> Option<SocketAddr> {
        self.monitoring_address
    }

    /// Returns the monitoring cache refresh interval in seconds.
    pub fn monitoring_cache_refresh_secs(&self) -> u64 {
        self.monitoring_cache_refresh_secs
    }

    pub fn set_log_dir(&mut self, log_dir: Option<PathBuf>) {
        if let Some(dir) = log_dir {
            self.log_file = Some(dir);
        }
    }
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Connection and poll settings for one monitored backend.
#[derive(Deserialize, Clone)]
pub struct BackendConfig {
    /// Display name. Unique across the file (case-insensitive); its slug
    /// forms the monitor's entity id.
    pub name: String,
    /// Host name or address of the media server.
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP port of the media server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect over HTTPS instead of HTTP.
    #[serde(default)]
    pub use_https: bool,
    /// Verify TLS certificates. Turn off for self-signed deployments.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// API key sent with every request to this backend.
    pub api_key: String,
    /// Seconds between background polls. `0` disables polling; the monitor
    /// then refreshes only at startup and on manual triggers.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Disabled backends are registered but never refreshed, and the fleet
    /// diagnostics skip them.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8096
}

fn default_verify_tls() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

impl BackendConfig {
    /// Creates a new `BackendConfig` instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        host: String,
        port: u16,
        use_https: bool,
        verify_tls: bool,
        api_key: String,
        scan_interval_secs: u64,
        enabled: bool,
    ) -> Self {
        Self {
            name,
            host,
            port,
            use_https,
            verify_tls,
            api_key,
            scan_interval_secs,
            enabled,
        }
    }

    /// Identifier derived from the display name, used in entity ids,
    /// monitoring URLs and log fields.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Connection parameters for the HTTP client.
    pub fn address(&self) -> BackendAddress {
        BackendAddress::new(
            self.host.clone(),
            self.port,
            self.use_https,
            self.verify_tls,
            self.api_key.clone(),
        )
    }

    /// Poll interval, or `None` when background polling is off.
    pub fn scan_interval(&self) -> Option<Duration> {
        (self.scan_interval_secs > 0).then(|| Duration::from_secs(self.scan_interval_secs))
    }
}

// The API key must never reach the logs, including through `{:?}` dumps of
// the whole config.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_https", &self.use_https)
            .field("verify_tls", &self.verify_tls)
            .field("api_key", &"<redacted>")
            .field("scan_interval_secs", &self.scan_interval_secs)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// How the rendered summary is produced.
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// Template for one active session's line. See
    /// [`template::TEMPLATE_KEYS`] for the recognized placeholders.
    #[serde(default = "default_session_template")]
    pub session_template: String,
    /// Summary text shown when no sessions are active.
    #[serde(default = "default_idle_message")]
    pub idle_message: String,
    /// Log a per-refresh summary of every backend at debug level.
    #[serde(default)]
    pub debug: bool,
}

fn default_session_template() -> String {
    "{icons} {user}: {series} \u{2013} {title}".to_string()
}

fn default_idle_message() -> String {
    "No active sessions".to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            session_template: default_session_template(),
            idle_message: default_idle_message(),
            debug: false,
        }
    }
}

/// Timing for the fleet-wide diagnostic counters.
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    /// Seconds the aggregators keep retrying before accepting that no
    /// monitor has appeared yet.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Seconds a recount is delayed so bursts of backend events collapse
    /// into a single pass.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Seconds between unconditional recount passes.
    #[serde(default = "default_periodic_secs")]
    pub periodic_secs: u64,
    /// Seconds between sweeps that recreate missing diagnostic entities.
    #[serde(default = "default_self_heal_secs")]
    pub self_heal_secs: u64,
}

fn default_settle_secs() -> u64 {
    10
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_periodic_secs() -> u64 {
    60
}

fn default_self_heal_secs() -> u64 {
    300
}

impl DiagnosticsConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
    pub fn periodic(&self) -> Duration {
        Duration::from_secs(self.periodic_secs)
    }
    pub fn self_heal(&self) -> Duration {
        Duration::from_secs(self.self_heal_secs)
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
            debounce_secs: default_debounce_secs(),
            periodic_secs: default_periodic_secs(),
            self_heal_secs: default_self_heal_secs(),
        }
    }
}
