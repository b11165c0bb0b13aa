use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use adpulse::config::Config;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.directory.mock_mode = true;
    config.server.frontend_dir = String::new();

    let state = adpulse::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    adpulse::api::router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-operator", "alice")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_status_reports_mock_mode() {
    let app = spawn_app().await;
    let (status, body) = get(&app, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mock_mode"], true);
}

#[tokio::test]
async fn test_users_paginated() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/users/paginated?page=2&page_size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
    assert_eq!(body["page"], 2);
    assert_eq!(body["total_count"], 5);
    assert_eq!(body["total_pages"], 3);
    assert_eq!(body["has_next"], true);
    assert_eq!(body["has_prev"], true);

    let (status, body) = get(&app, "/api/users/paginated?page=9&page_size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["users"].as_array().unwrap().is_empty());
    assert_eq!(body["has_next"], false);

    let (status, body) = get(&app, "/api/users/paginated?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = get(&app, "/api/users/paginated?page_size=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_filtered_by_group_and_search() {
    let app = spawn_app().await;
    let (status, body) = get(&app, "/api/users?group=Finance&search=smith").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["sam_account_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["jane.smith"]);
}

#[tokio::test]
async fn test_unknown_user_is_404_with_detail() {
    let app = spawn_app().await;
    let (status, body) = get(&app, "/api/users/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["detail"].as_str().unwrap().contains("nobody"));
}

#[tokio::test]
async fn test_disable_is_idempotent_and_audited_with_operator() {
    let app = spawn_app().await;

    for _ in 0..2 {
        let (status, body) = post_json(
            &app,
            "/api/users/john.doe/account-status",
            json!({ "enabled": false }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["enabled"], false);
    }

    let (_, user) = get(&app, "/api/users/john.doe").await;
    assert_eq!(user["account_disabled"], true);

    let (status, logs) = get(&app, "/api/audit/logs?target_object=john.doe").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["total_count"], 2);
    for entry in logs["logs"].as_array().unwrap() {
        assert_eq!(entry["performed_by"], "alice");
        assert_eq!(entry["action_type"], "account_disable");
        assert_eq!(entry["source"], "web_app");
        assert_eq!(entry["success"], true);
    }
}

#[tokio::test]
async fn test_failed_mutation_is_audited() {
    let app = spawn_app().await;
    let (status, body) = post_json(
        &app,
        "/api/users/john.doe/groups/add",
        json!({ "group_name": "No Such Group" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (_, logs) = get(&app, "/api/audit/logs").await;
    assert_eq!(logs["total_count"], 1);
    assert_eq!(logs["logs"][0]["success"], false);
    assert!(logs["logs"][0]["error_message"].is_string());
}

#[tokio::test]
async fn test_rejected_member_name_is_audited() {
    let app = spawn_app().await;
    let (status, body) = post_json(
        &app,
        "/api/groups/Finance/members/add",
        json!({ "sam_account_name": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (_, logs) = get(&app, "/api/audit/logs").await;
    assert_eq!(logs["total_count"], 1);
    assert_eq!(logs["logs"][0]["action_type"], "member_add");
    assert_eq!(logs["logs"][0]["performed_by"], "alice");
    assert_eq!(logs["logs"][0]["success"], false);
}

#[tokio::test]
async fn test_move_computer_round_trip() {
    let app = spawn_app().await;
    let (_, before) = get(&app, "/api/computers/PC-001").await;
    let original = before["container_dn"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &app,
        "/api/computers/PC-001/move",
        json!({ "target_ou_dn": "OU=Servers,DC=example,DC=com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, moved) = get(&app, "/api/computers/PC-001").await;
    assert_eq!(moved["organizational_unit"], "Servers");

    let (status, _) = post_json(
        &app,
        "/api/computers/PC-001/move",
        json!({ "target_ou_dn": original }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, back) = get(&app, "/api/computers/PC-001").await;
    assert_eq!(back["distinguished_name"], before["distinguished_name"]);

    let (_, logs) = get(&app, "/api/audit/logs?action_type=computer_move").await;
    assert_eq!(logs["total_count"], 2);
}

#[tokio::test]
async fn test_group_lifecycle_over_http() {
    let app = spawn_app().await;

    let (status, _) = post_json(
        &app,
        "/api/groups",
        json!({ "name": "Project X", "description": "temporary" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(&app, "/api/groups", json!({ "name": "Project X" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = post_json(
        &app,
        "/api/groups/Project%20X/members/add",
        json!({ "sam_account_name": "jane.smith" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/groups/Project%20X")
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_json(
        &app,
        "/api/groups/Project%20X/members/remove",
        json!({ "sam_account_name": "jane.smith" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/api/groups/Project%20X").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let app = spawn_app().await;
    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/users/john.doe/account-status")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_report_parameters_are_validated() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/reports/password-expiry?days=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days_threshold"], 7);

    let (status, _) = get(&app, "/api/reports/password-expiry?days=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/api/reports/inactive-computers?days=366").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/api/changes/recent?hours=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_stats() {
    let app = spawn_app().await;
    let (status, body) = get(&app, "/api/dashboard/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_users"], 5);
    assert_eq!(body["disabled_users"], 1);
    assert_eq!(body["total_computers"], 4);
}

#[tokio::test]
async fn test_connection_failure_does_not_echo_password() {
    let app = spawn_app().await;
    let (status, body) = post_json(
        &app,
        "/api/test-connection",
        json!({
            "server": "ldap://127.0.0.1:1",
            "domain": "EXAMPLE",
            "username": "svc",
            "password": "hunter2-secret",
            "base_dn": "DC=example,DC=com"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(!body.to_string().contains("hunter2-secret"));

    let (status, body) = post_json(&app, "/api/test-connection", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_connection_settings_lifecycle() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/settings/connection").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/api/settings/connection")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "server": "ldaps://dc01.example.com",
                    "domain": "EXAMPLE",
                    "username": "svc",
                    "password": "never-stored",
                    "base_dn": "DC=example,DC=com"
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"], "ldaps://dc01.example.com");
    assert!(body.get("password").is_none());

    let (_, body) = get(&app, "/api/settings/connection").await;
    assert_eq!(body["base_dn"], "DC=example,DC=com");
    assert!(!body.to_string().contains("never-stored"));

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/api/settings/connection")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get(&app, "/api/settings/connection").await;
    assert!(body.is_null());
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = spawn_app().await;

    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "ok");

    let (status, body) = get(&app, "/api/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = get(&app, "/api/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
