//! Small shared utilities for the integration tests.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use serde_json::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_ATTEMPTS: u32 = 100;

/// Binds an OS-assigned port and releases it, so a server about to start
/// can claim the address.
pub fn get_available_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind an ephemeral port");
    listener
        .local_addr()
        .expect("Failed to read the bound address")
}

/// Polls `condition` until it holds, panicking with `what` after ten
/// seconds.
pub async fn wait_for(condition: impl Fn() -> bool, what: &str) {
    for _ in 0..POLL_ATTEMPTS {
        if condition() {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("Timed out waiting for {what}");
}

/// Polls the health endpoint until the monitoring server answers.
pub async fn wait_for_monitoring_api(address: SocketAddr) {
    let url = format!("http://{address}/api/v1/health");
    for _ in 0..POLL_ATTEMPTS {
        if reqwest::get(&url).await.is_ok() {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("Monitoring API at {address} never became reachable");
}

/// Repeatedly fetches `url` until `accept` likes the JSON body, returning
/// that body. Panics with the last body after ten seconds.
pub async fn wait_for_json(url: &str, accept: impl Fn(&Value) -> bool) -> Value {
    let mut last = Value::Null;
    for _ in 0..POLL_ATTEMPTS {
        if let Ok(response) = reqwest::get(url).await {
            if let Ok(body) = response.json::<Value>().await {
                if accept(&body) {
                    return body;
                }
                last = body;
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("Timed out polling {url}; last body: {last}");
}

/// Fetches JSON once, panicking on transport or decode errors.
pub async fn fetch_json(url: &str) -> Value {
    reqwest::get(url)
        .await
        .unwrap_or_else(|e| panic!("GET {url} failed: {e}"))
        .json()
        .await
        .unwrap_or_else(|e| panic!("GET {url} returned a non-JSON body: {e}"))
}

/// Fetches a plain-text body once.
pub async fn fetch_text(url: &str) -> String {
    reqwest::get(url)
        .await
        .unwrap_or_else(|e| panic!("GET {url} failed: {e}"))
        .text()
        .await
        .unwrap_or_else(|e| panic!("GET {url} returned an unreadable body: {e}"))
}
