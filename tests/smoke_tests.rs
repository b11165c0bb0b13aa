//! Smoke tests for the flows the web frontend depends on.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use adpulse::config::Config;
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

fn temp_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("adpulse-{prefix}-{}", uuid::Uuid::new_v4()))
}

fn file_config(db_path: &PathBuf) -> Config {
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.directory.mock_mode = true;
    config.server.frontend_dir = String::new();
    config
}

async fn spawn_app(config: Config) -> (Arc<adpulse::api::AppState>, Router) {
    let state = adpulse::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    let router = adpulse::api::router(state.clone());
    (state, router)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn smoke_audit_trail_survives_restart() {
    let db_path = temp_path("audit").with_extension("db");

    {
        let (_, app) = spawn_app(file_config(&db_path)).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/users/jane.smith/reset-password")
                    .header("Content-Type", "application/json")
                    .header("X-Operator", "helpdesk")
                    .body(Body::from(
                        serde_json::json!({
                            "new_password": "Str0ng!Passw0rd",
                            "must_change": true
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (_, app) = spawn_app(file_config(&db_path)).await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/audit/statistics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    let stats: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(stats["total_actions"], 1);
    assert_eq!(stats["actions_by_type"]["password_reset"], 1);
    assert_eq!(stats["actions_by_user"]["helpdesk"], 1);
    assert!(!text.contains("Str0ng!Passw0rd"));

    std::fs::remove_file(&db_path).ok();
}

#[tokio::test]
async fn smoke_change_monitor_writes_audit_entries() {
    let db_path = temp_path("changes").with_extension("db");
    let (state, app) = spawn_app(file_config(&db_path)).await;

    let recorded = state.changes.detect_changes().await.unwrap();
    assert!(recorded > 0);
    assert_eq!(state.changes.detect_changes().await.unwrap(), 0);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/audit/logs?source=ad_detected")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let logs: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(logs["total_count"], recorded as u64);
    assert_eq!(logs["logs"][0]["performed_by"], "directory");

    std::fs::remove_file(&db_path).ok();
}

#[tokio::test]
async fn smoke_frontend_is_served_with_spa_fallback() {
    let frontend = temp_path("frontend");
    std::fs::create_dir_all(&frontend).unwrap();
    std::fs::write(frontend.join("index.html"), "<html>adpulse</html>").unwrap();

    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.directory.mock_mode = true;
    config.server.frontend_dir = frontend.display().to_string();
    let (_, app) = spawn_app(config).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/users/john.doe")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("adpulse"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/ous")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ous: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(ous.as_array().unwrap().iter().any(|ou| ou["name"] == "Servers"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/no-such-route")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["success"], false);

    std::fs::remove_dir_all(&frontend).ok();
}

#[tokio::test]
async fn smoke_reports_render() {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.directory.mock_mode = true;
    config.server.frontend_dir = String::new();
    let (_, app) = spawn_app(config).await;

    for uri in [
        "/api/reports/password-expiry",
        "/api/reports/inactive-computers",
        "/api/reports/computer-inventory",
        "/api/changes/recent",
        "/api/dashboard/stats",
        "/api/groups",
        "/api/computers/paginated",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}
