//! HTTP client for a single backend.
//!
//! One refresh issues two read-only calls, sessions then library counts,
//! under a combined [`FETCH_BUDGET`]. The client owns its connection pool,
//! so dropping the owning coordinator tears the pool down with it.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use super::wire::{LibraryCounts, RawSession};

/// Total time budget for one refresh, covering both requests.
pub const FETCH_BUDGET: Duration = Duration::from_secs(10);

/// Where and how to reach one backend. Immutable after construction.
#[derive(Debug, Clone)]
pub struct BackendAddress {
    host: String,
    port: u16,
    use_https: bool,
    verify_tls: bool,
    api_key: String,
}

impl BackendAddress {
    pub fn new(
        host: String,
        port: u16,
        use_https: bool,
        verify_tls: bool,
        api_key: String,
    ) -> Self {
        Self {
            host,
            port,
            use_https,
            verify_tls,
            api_key,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> &'static str {
        if self.use_https {
            "https"
        } else {
            "http"
        }
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    /// `scheme://host:port`, safe to log.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// Full request URL including the credential. Never log this.
    fn request_url(&self, path: &str) -> String {
        format!("{}{}?api_key={}", self.base_url(), path, self.api_key)
    }
}

/// Why a fetch failed. Cloneable so an in-flight outcome can be handed to
/// every caller that collapsed onto the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("refresh exceeded the {}s fetch budget", FETCH_BUDGET.as_secs())]
    Timeout,
    #[error("cannot connect to backend: {0}")]
    ConnectionRefused(String),
    #[error("backend rejected the API key (HTTP 401)")]
    Unauthorized,
    #[error("backend returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("backend request failed: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectionRefused(err.without_url().to_string())
        } else if err.is_decode() {
            FetchError::MalformedResponse(err.without_url().to_string())
        } else {
            FetchError::Unknown(err.without_url().to_string())
        }
    }
}

/// Operator-facing category for a failed connection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDiagnosis {
    InvalidApiKey,
    CannotConnect,
    Unknown,
}

impl ConnectionDiagnosis {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionDiagnosis::InvalidApiKey => "invalid_api_key",
            ConnectionDiagnosis::CannotConnect => "cannot_connect",
            ConnectionDiagnosis::Unknown => "unknown",
        }
    }
}

impl FetchError {
    pub fn diagnosis(&self) -> ConnectionDiagnosis {
        match self {
            FetchError::Unauthorized => ConnectionDiagnosis::InvalidApiKey,
            FetchError::Timeout | FetchError::ConnectionRefused(_) => {
                ConnectionDiagnosis::CannotConnect
            }
            FetchError::MalformedResponse(_) | FetchError::Unknown(_) => {
                ConnectionDiagnosis::Unknown
            }
        }
    }
}

/// Everything one successful refresh brings back.
#[derive(Debug, Clone, Default)]
pub struct FetchedState {
    pub sessions: Vec<RawSession>,
    pub library_counts: LibraryCounts,
}

/// Read-only HTTP client for one backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    address: BackendAddress,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(address: BackendAddress) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().timeout(FETCH_BUDGET);
        if !address.verify_tls() {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| FetchError::Unknown(e.to_string()))?;
        Ok(Self { address, http })
    }

    pub fn address(&self) -> &BackendAddress {
        &self.address
    }

    /// Fetches sessions and library counts under the combined budget.
    pub async fn fetch_state(&self) -> Result<FetchedState, FetchError> {
        match tokio::time::timeout(FETCH_BUDGET, self.fetch_state_inner()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    async fn fetch_state_inner(&self) -> Result<FetchedState, FetchError> {
        let sessions = self.fetch_sessions().await?;
        let library_counts = self.fetch_library_counts().await?;
        Ok(FetchedState {
            sessions,
            library_counts,
        })
    }

    pub async fn fetch_sessions(&self) -> Result<Vec<RawSession>, FetchError> {
        self.get_json("/Sessions").await
    }

    pub async fn fetch_library_counts(&self) -> Result<LibraryCounts, FetchError> {
        self.get_json("/Items/Counts").await
    }

    /// One-shot probe used when a backend configuration is first accepted.
    pub async fn check_connection(&self) -> Result<(), FetchError> {
        self.fetch_sessions().await.map(|_| ())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        debug!(
            base_url = %self.address.base_url(),
            path,
            verify_tls = self.address.verify_tls(),
            "backend request"
        );
        let response = self.http.get(self.address.request_url(path)).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized),
            status => Err(FetchError::Unknown(format!(
                "backend returned HTTP {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address(use_https: bool) -> BackendAddress {
        BackendAddress::new(
            "media.local".to_string(),
            8096,
            use_https,
            true,
            "secret".to_string(),
        )
    }

    #[test]
    fn base_url_follows_scheme() {
        assert_eq!(test_address(false).base_url(), "http://media.local:8096");
        assert_eq!(test_address(true).base_url(), "https://media.local:8096");
    }

    #[test]
    fn request_url_carries_api_key() {
        let url = test_address(false).request_url("/Sessions");
        assert_eq!(url, "http://media.local:8096/Sessions?api_key=secret");
    }

    #[test]
    fn diagnosis_buckets_errors_for_operators() {
        assert_eq!(
            FetchError::Unauthorized.diagnosis(),
            ConnectionDiagnosis::InvalidApiKey
        );
        assert_eq!(
            FetchError::Timeout.diagnosis(),
            ConnectionDiagnosis::CannotConnect
        );
        assert_eq!(
            FetchError::ConnectionRefused("refused".to_string()).diagnosis(),
            ConnectionDiagnosis::CannotConnect
        );
        assert_eq!(
            FetchError::MalformedResponse("bad json".to_string()).diagnosis(),
            ConnectionDiagnosis::Unknown
        );
        assert_eq!(
            FetchError::Unknown("HTTP 500".to_string()).diagnosis(),
            ConnectionDiagnosis::Unknown
        );
    }

    #[test]
    fn diagnosis_strings_are_stable() {
        assert_eq!(ConnectionDiagnosis::InvalidApiKey.as_str(), "invalid_api_key");
        assert_eq!(ConnectionDiagnosis::CannotConnect.as_str(), "cannot_connect");
        assert_eq!(ConnectionDiagnosis::Unknown.as_str(), "unknown");
    }
}
