// This file contains integration tests for the Jellywatch daemon.
use integration_tests_jellywatch::{
    mock_backend::{playing_episode, playing_movie, Fault, MockBackend},
    utils::{fetch_json, fetch_text, get_available_address, wait_for, wait_for_json},
    *,
};
use jellywatch::coordinator::BackendMonitor;
use jellywatch_apps::backend::FetchError;
use serde_json::json;
use std::time::Duration;

// One backend whose mock reports a playing movie and a playing episode. The
// monitoring API must show the backend active, with the rendered summary,
// per-type counts and library totals.
#[tokio::test]
async fn test_daemon_reports_an_active_backend() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;
    mock.set_sessions(json!([
        playing_movie("alice", "The Matrix"),
        playing_episode("bob", "Some Show", "Pilot"),
    ]));
    mock.set_library_counts(json!({"MovieCount": 42, "SeriesCount": 7}));

    let monitoring =
        start_jellywatch(vec![backend_config("Main", backend_address, "test-key")]).await;

    let backend = wait_for_json(
        &format!("http://{monitoring}/api/v1/backends/main"),
        |body| body["available"] == true,
    )
    .await;

    assert_eq!(backend["name"], "Main");
    assert_eq!(backend["state"], "Active");
    assert_eq!(backend["polling_enabled"], false);
    assert_eq!(backend["server_version"], "10.9.2");
    assert_eq!(backend["counts"]["active"], 2);
    assert_eq!(backend["counts"]["movie"], 1);
    assert_eq!(backend["counts"]["episode"], 1);
    assert_eq!(backend["library_counts"]["MovieCount"], 42);
    assert!(backend["last_error"].is_null());
    let summary = backend["summary"].as_str().expect("summary is a string");
    assert!(
        summary.contains("alice") && summary.contains("The Matrix"),
        "summary should name user and title: {summary}"
    );

    // Sessions come back sorted by user, flattened for the API.
    let sessions = fetch_json(&format!("http://{monitoring}/api/v1/backends/main/sessions")).await;
    assert_eq!(sessions["total"], 2);
    assert_eq!(sessions["items"][0]["user"], "alice");
    assert_eq!(sessions["items"][0]["media_type"], "Movie");
    assert_eq!(sessions["items"][1]["series"], "Some Show");

    let listing = fetch_json(&format!("http://{monitoring}/api/v1/backends")).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["slug"], "main");
    assert_eq!(listing["items"][0]["active_sessions"], 2);

    let global = fetch_json(&format!("http://{monitoring}/api/v1/global")).await;
    assert_eq!(global["backends"]["total"], 1);
    assert_eq!(global["backends"]["available"], 1);
    assert_eq!(global["backends"]["active_sessions"], 2);
}

// Five concurrent refreshes of one monitor collapse onto a single fetch
// pass against the backend.
#[tokio::test]
async fn test_concurrent_refreshes_collapse_into_one_fetch() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;
    mock.set_sessions(json!([playing_movie("alice", "Heat")]));

    let monitor = BackendMonitor::new(&backend_config("Main", backend_address, "test-key"))
        .expect("Failed to build the monitor");

    let (a, b, c, d, e) = tokio::join!(
        monitor.refresh(),
        monitor.refresh(),
        monitor.refresh(),
        monitor.refresh(),
        monitor.refresh(),
    );
    for outcome in [a, b, c, d, e] {
        outcome.expect("Collapsed refreshes must all succeed");
    }

    assert_eq!(mock.session_hits(), 1);
    assert_eq!(mock.counts_hits(), 1);
    assert!(monitor.snapshot().is_populated());

    // A refresh after the burst is a fresh pass.
    monitor.refresh().await.expect("Follow-up refresh failed");
    assert_eq!(mock.session_hits(), 2);
}

// A backend that served one good refresh starts rejecting requests. The
// daemon reports it unavailable with the failure message while continuing
// to serve the last good snapshot, and recovers once the backend does.
#[tokio::test]
async fn test_failed_refresh_keeps_the_last_good_snapshot() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;
    mock.set_sessions(json!([playing_movie("alice", "Heat")]));

    let monitoring =
        start_jellywatch(vec![backend_config("Main", backend_address, "test-key")]).await;
    let url = format!("http://{monitoring}/api/v1/backends/main");
    let refresh_url = format!("http://{monitoring}/api/v1/backends/main/refresh");
    wait_for_json(&url, |body| body["available"] == true).await;

    mock.set_fault(Fault::Unauthorized);
    let client = reqwest::Client::new();
    let accepted = client
        .post(&refresh_url)
        .send()
        .await
        .expect("Failed to request a refresh");
    assert_eq!(accepted.status(), 202);

    let backend = wait_for_json(&url, |body| body["available"] == false).await;
    assert_eq!(backend["state"], "Active");
    assert_eq!(backend["counts"]["active"], 1);
    assert!(backend["last_updated"].is_string());
    let error = backend["last_error"]
        .as_str()
        .expect("last_error is recorded");
    assert!(error.contains("API key"), "unexpected error text: {error}");
    let summary = backend["summary"].as_str().expect("summary is a string");
    assert!(
        summary.contains("Heat"),
        "stale summary should survive the outage: {summary}"
    );

    // Clearing the fault and refreshing restores availability.
    mock.set_fault(Fault::None);
    let accepted = client
        .post(&refresh_url)
        .send()
        .await
        .expect("Failed to request a refresh");
    assert_eq!(accepted.status(), 202);
    let backend = wait_for_json(&url, |body| body["available"] == true).await;
    assert!(backend["last_error"].is_null());
}

// POST /refresh answers 202 for a known slug and actually triggers a
// fetch; unknown slugs get 404.
#[tokio::test]
async fn test_manual_refresh_schedules_a_fetch() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;

    let monitoring =
        start_jellywatch(vec![backend_config("Main", backend_address, "test-key")]).await;
    let hits_before = mock.session_hits();

    let client = reqwest::Client::new();
    let accepted = client
        .post(format!("http://{monitoring}/api/v1/backends/main/refresh"))
        .send()
        .await
        .expect("Failed to request a refresh");
    assert_eq!(accepted.status(), 202);
    let body: serde_json::Value = accepted.json().await.expect("202 body is JSON");
    assert_eq!(body["backend"], "main");
    assert_eq!(body["status"], "scheduled");

    wait_for(|| mock.session_hits() > hits_before, "the scheduled fetch").await;

    let missing = client
        .post(format!("http://{monitoring}/api/v1/backends/nope/refresh"))
        .send()
        .await
        .expect("Failed to reach the refresh endpoint");
    assert_eq!(missing.status(), 404);
}

// Two backends, one reachable and one pointing at a dead port. The
// diagnostics endpoint must settle on both tracked, one unavailable, with
// the reporting duty attached to the first monitor.
#[tokio::test]
async fn test_diagnostics_settle_over_a_mixed_fleet() {
    start_tracing();
    let backend_address = get_available_address();
    let _mock = MockBackend::new(backend_address, "test-key").start().await;
    let dead_address = get_available_address();

    let monitoring = start_jellywatch(vec![
        backend_config("Alpha", backend_address, "test-key"),
        backend_config("Beta", dead_address, "test-key"),
    ])
    .await;

    let diagnostics = wait_for_json(
        &format!("http://{monitoring}/api/v1/diagnostics"),
        |body| body["settled"] == true && body["total_backends"] == 2,
    )
    .await;

    assert_eq!(diagnostics["unavailable_backends"], 1);
    assert_eq!(
        diagnostics["tracked"],
        json!(["session_monitor_alpha", "session_monitor_beta"])
    );
    assert_eq!(diagnostics["attached"], "session_monitor_alpha");
}

// The Prometheus endpoint carries per-backend and fleet-level gauges.
#[tokio::test]
async fn test_prometheus_metrics_cover_backends_and_diagnostics() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;
    mock.set_sessions(json!([playing_movie("alice", "Heat")]));

    let monitoring =
        start_jellywatch(vec![backend_config("Main", backend_address, "test-key")]).await;

    wait_for_json(
        &format!("http://{monitoring}/api/v1/backends/main"),
        |body| body["available"] == true,
    )
    .await;
    wait_for_json(&format!("http://{monitoring}/api/v1/diagnostics"), |body| {
        body["settled"] == true
    })
    .await;

    let metrics = fetch_text(&format!("http://{monitoring}/metrics")).await;
    assert!(metrics.contains("jellywatch_uptime_seconds"));
    assert!(metrics.contains("jellywatch_backend_up{backend=\"main\"} 1"));
    assert!(metrics.contains("jellywatch_backend_active_sessions{backend=\"main\"} 1"));
    assert!(metrics.contains("jellywatch_backends_total 1"));
    assert!(metrics.contains("jellywatch_backends_unavailable 0"));
}

// The connection probe distinguishes a rejected key from an unreachable
// host.
#[tokio::test]
async fn test_connection_check_classifies_failures() {
    start_tracing();
    let backend_address = get_available_address();
    let _mock = MockBackend::new(backend_address, "right-key").start().await;

    let monitor = BackendMonitor::new(&backend_config("Main", backend_address, "wrong-key"))
        .expect("Failed to build the monitor");
    let error = monitor
        .check_connection()
        .await
        .expect_err("A wrong key must be rejected");
    assert!(matches!(error, FetchError::Unauthorized));
    assert_eq!(error.diagnosis().as_str(), "invalid_api_key");

    let monitor = BackendMonitor::new(&backend_config("Dead", get_available_address(), "any-key"))
        .expect("Failed to build the monitor");
    let error = monitor
        .check_connection()
        .await
        .expect_err("A dead port must be unreachable");
    assert_eq!(error.diagnosis().as_str(), "cannot_connect");
}

// With a scan interval of zero the monitor fetches once at startup and
// then leaves the backend alone.
#[tokio::test]
async fn test_polling_off_fetches_only_at_startup() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;

    let _monitoring =
        start_jellywatch(vec![backend_config("Main", backend_address, "test-key")]).await;

    assert_eq!(mock.session_hits(), 1);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.session_hits(), 1);
}

// A ten second scan interval keeps refreshing in the background without
// anyone asking.
#[tokio::test]
async fn test_background_polling_refreshes_on_schedule() {
    start_tracing();
    let backend_address = get_available_address();
    let mock = MockBackend::new(backend_address, "test-key").start().await;

    let mut polling_backend = backend_config("Main", backend_address, "test-key");
    polling_backend.scan_interval_secs = 10;
    let _monitoring = start_jellywatch(vec![polling_backend]).await;

    let startup_hits = mock.session_hits();
    // One full scan interval plus slack.
    for _ in 0..150 {
        if mock.session_hits() > startup_hits {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("The monitor never polled on its own; hits stayed at {startup_hits}");
}
