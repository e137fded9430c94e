//! Integration tests for the collector HTTP server

#[cfg(all(feature = "server", feature = "client"))]
mod server_tests {
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use visit_telemetry::server::{run, run_with_store, ServerConfig, StorageBackend};
    use visit_telemetry::store::{KvStore, StoreError};

    async fn start(token: Option<&str>) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let config = ServerConfig::new(0, token.map(str::to_string), StorageBackend::Memory);
        let started = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        started
    }

    async fn stats(client: &reqwest::Client, addr: SocketAddr) -> Value {
        let response = client
            .get(format!("http://{}/analytics/stats", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        response.json().await.expect("Failed to parse JSON")
    }

    async fn post(client: &reqwest::Client, addr: SocketAddr, path: &str, body: Value) -> reqwest::Response {
        client
            .post(format!("http://{}{}", addr, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    fn session(session_id: &str, duration: i64, depth: i64, interactions: i64) -> Value {
        json!({
            "sessionId": session_id,
            "startTime": 1_700_000_000_000_i64,
            "endTime": 1_700_000_000_000_i64 + duration,
            "duration": duration,
            "pageViews": 1,
            "maxScrollDepth": depth,
            "interactions": interactions
        })
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(None).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_page_view_appears_in_stats() {
        let (addr, shutdown_tx) = start(None).await;
        let client = reqwest::Client::new();

        let before = stats(&client, addr).await;
        assert_eq!(before["totalPageViews"], 0);

        let response = post(
            &client,
            addr,
            "/analytics/pageview",
            json!({
                "path": "/",
                "referrer": "",
                "timestamp": 1,
                "sessionId": "session_1_abcdefghi",
                "viewport": {"width": 1280, "height": 720},
                "userAgent": "integration-test"
            }),
        )
        .await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body, json!({"success": true}));

        let after = stats(&client, addr).await;
        assert_eq!(after["totalPageViews"], 1);
        assert_eq!(after["recentPageViews"][0]["path"], "/");
        assert_eq!(after["recentPageViews"][0]["sessionId"], "session_1_abcdefghi");
        // The server's clock replaces the client timestamp
        assert!(after["recentPageViews"][0]["timestamp"].as_i64().unwrap() > 1);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_500() {
        let (addr, shutdown_tx) = start(None).await;
        let client = reqwest::Client::new();

        for path in ["/analytics/pageview", "/analytics/event", "/analytics/session"] {
            let response = client
                .post(format!("http://{}{}", addr, path))
                .header("Content-Type", "application/json")
                .body("{\"path\": ")
                .send()
                .await
                .expect("Failed to send request");

            assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            let body: Value = response.json().await.expect("Failed to parse JSON");
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().is_some());
        }

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_duplicate_session_finalize_keeps_one_record() {
        let (addr, shutdown_tx) = start(None).await;
        let client = reqwest::Client::new();

        let first = post(&client, addr, "/analytics/session", session("session_dup", 4_000, 30, 1)).await;
        let second = post(&client, addr, "/analytics/session", session("session_dup", 9_000, 80, 3)).await;
        assert!(first.status().is_success());
        assert!(second.status().is_success());

        let stats = stats(&client, addr).await;
        assert_eq!(stats["totalSessions"], 1);
        assert_eq!(stats["sessions"][0]["duration"], 9_000);
        assert_eq!(stats["avgSessionDuration"], 9);
        assert_eq!(stats["totalInteractions"], 3);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_stats_aggregates_sessions_and_events() {
        let (addr, shutdown_tx) = start(None).await;
        let client = reqwest::Client::new();

        for (id, duration, depth) in [("a", 10_000, 20), ("b", 20_000, 60), ("c", 30_000, 100)] {
            post(&client, addr, "/analytics/session", session(id, duration, depth, 2)).await;
        }
        for n in 0..12 {
            post(
                &client,
                addr,
                "/analytics/event",
                json!({"event": "click", "timestamp": 0, "data": {"sessionId": "a", "n": n}}),
            )
            .await;
        }

        let stats = stats(&client, addr).await;
        assert_eq!(stats["totalSessions"], 3);
        assert_eq!(stats["avgSessionDuration"], 20);
        assert_eq!(stats["avgScrollDepth"], 60);
        assert_eq!(stats["totalInteractions"], 6);
        assert_eq!(stats["totalEvents"], 12);
        assert_eq!(stats["recentEvents"].as_array().unwrap().len(), 10);
        assert_eq!(stats["recentEvents"][0]["data"]["n"], 11);
        assert_eq!(stats["sessions"][0]["sessionId"], "c");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_bearer_token_is_enforced() {
        let (addr, shutdown_tx) = start(Some("test-token")).await;
        let client = reqwest::Client::new();
        let body = json!({"path": "/", "sessionId": "s"});

        let anonymous = post(&client, addr, "/analytics/pageview", body.clone()).await;
        assert_eq!(anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);
        let rejection: Value = anonymous.json().await.expect("Failed to parse JSON");
        assert_eq!(rejection["success"], false);

        let wrong = client
            .post(format!("http://{}/analytics/pageview", addr))
            .bearer_auth("other-token")
            .json(&body)
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(wrong.status(), reqwest::StatusCode::UNAUTHORIZED);

        let authorized = client
            .post(format!("http://{}/analytics/pageview", addr))
            .bearer_auth("test-token")
            .json(&body)
            .send()
            .await
            .expect("Failed to send request");
        assert!(authorized.status().is_success());

        // Liveness stays open
        let health = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(health.status().is_success());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start(Some("test-token")).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/analytics/event", addr))
            .header("Origin", "https://portfolio.example")
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "authorization,content-type")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );

        let _ = shutdown_tx.send(());
    }

    struct UnavailableStore;

    impl KvStore for UnavailableStore {
        fn set(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk detached".to_string()))
        }

        fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Unavailable("disk detached".to_string()))
        }

        fn get_by_prefix(&self, _prefix: &str) -> Result<Vec<Value>, StoreError> {
            Err(StoreError::Unavailable("disk detached".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_reported() {
        let config = ServerConfig::new(0, None, StorageBackend::Memory);
        let (addr, shutdown_tx) = run_with_store(config, Arc::new(UnavailableStore))
            .await
            .expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{}/analytics/stats", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("disk detached"));

        let write = post(&client, addr, "/analytics/session", session("s", 1, 1, 1)).await;
        assert_eq!(write.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        // Health does not depend on the store
        let health = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(health.status().is_success());

        let _ = shutdown_tx.send(());
    }

    fn test_store_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("visit-telemetry-server-test-{}", uuid::Uuid::new_v4()))
            .join("store.jsonl")
    }

    #[tokio::test]
    async fn test_file_backend_survives_restart() {
        let path = test_store_path();
        let client = reqwest::Client::new();

        let config = ServerConfig::new(0, None, StorageBackend::File(path.clone()));
        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
        tokio::time::sleep(Duration::from_millis(100)).await;
        post(&client, addr, "/analytics/pageview", json!({"path": "/about", "sessionId": "s"})).await;
        post(&client, addr, "/analytics/session", session("s", 2_000, 50, 0)).await;
        let _ = shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let config = ServerConfig::new(0, None, StorageBackend::File(path));
        let (addr, shutdown_tx) = run(config).await.expect("Failed to restart server");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = stats(&client, addr).await;
        assert_eq!(stats["totalPageViews"], 1);
        assert_eq!(stats["recentPageViews"][0]["path"], "/about");
        assert_eq!(stats["totalSessions"], 1);

        let _ = shutdown_tx.send(());
    }
}
