//! Operational endpoint integration tests.
//!
//! Tests `/health` (liveness), `/ready` (readiness), and `/metrics` using
//! the `TestRelayServer` harness. The harness pool points at an unreachable
//! address, so readiness reports the dependency as unhealthy.

use sb_test_utils::{RelayClient, TestRelayServer, TestUser};

/// `/health` returns 200 and plain text "OK" regardless of dependencies.
#[tokio::test]
async fn test_health_endpoint_returns_200_ok() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::builder().spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

/// `/ready` returns 503 with a generic JSON body when the membership store
/// is unreachable; no connection details leak.
#[tokio::test]
async fn test_ready_endpoint_reports_unreachable_store() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::builder().spawn().await?;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/ready", server.url())).send().await?;

    assert_eq!(response.status(), 503);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type.as_deref().is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["database"], "unhealthy");
    assert_eq!(body["error"], "Service dependencies unavailable");
    assert!(!body["error"].to_string().contains("127.0.0.1"));
    Ok(())
}

/// `/metrics` renders Prometheus exposition and reflects served traffic.
#[tokio::test]
async fn test_metrics_endpoint_renders_exposition() -> Result<(), anyhow::Error> {
    let ada = TestUser::new(1);
    let server = TestRelayServer::builder()
        .with_user_in_room(&ada, "r1")
        .spawn()
        .await?;

    // Generate one admission so the relay counters exist.
    let (client, _, _) = RelayClient::join(&server.ws_url(Some(&ada.token()), Some("r1"))).await?;
    client.close().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body = response.text().await?;
    assert!(
        body.contains("sb_admissions_total"),
        "admission counter missing from exposition: {body}"
    );
    Ok(())
}

/// Unknown routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::builder().spawn().await?;

    let response = reqwest::get(format!("{}/nonexistent", server.url())).await?;
    assert_eq!(response.status(), 404);
    Ok(())
}

/// A plain GET against `/ws` (no upgrade headers) is refused before any
/// admission logic runs.
#[tokio::test]
async fn test_ws_route_requires_upgrade() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::builder().spawn().await?;

    let response = reqwest::get(format!("{}/ws?token=x&room=r1", server.url())).await?;
    assert!(response.status().is_client_error());
    Ok(())
}
