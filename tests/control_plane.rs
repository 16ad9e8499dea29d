//! HTTP control plane over in-memory tasks.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use binlog_sync::server::{router, AppState};
use binlog_sync::testing::{MemorySinkFactory, ScriptedSource};
use binlog_sync::CheckpointTiming;
use common::{eventually, harness, orders_destination, pos, Harness};
use mysql_sink::testing::MemoryExecutor;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn app(source: ScriptedSource) -> (Harness, Router) {
    let h = harness(
        source,
        MemorySinkFactory::new().with_executor("primary", MemoryExecutor::new().with_table("orders", &["id"])),
        vec![("primary", orders_destination(json!({})))],
        CheckpointTiming::default(),
    )
    .await;
    let app = router(AppState::new(h.builder.clone()));
    (h, app)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    call(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(app, request).await
}

// =============================================================================
// Request validation
// =============================================================================

#[tokio::test]
async fn test_bad_and_unknown_ids() {
    let (_h, app) = app(ScriptedSource::new()).await;

    for uri in ["/api/task", "/api/task?id=abc", "/api/task?id=0", "/api/task/start?id=-3"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], 400);
    }

    for uri in ["/api/task?id=99", "/api/task/start?id=99", "/api/task/stop?id=99"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["message"], "task not found.");
    }
}

#[tokio::test]
async fn test_create_and_list_tasks() {
    let (_h, app) = app(ScriptedSource::new()).await;

    let (status, body) = post(
        &app,
        "/api/task",
        json!({
            "title": "users replica",
            "src": {"host": "users.local", "username": "repl"},
            "destinations": [{"name": "copy", "config": orders_destination(json!({}))}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], 2);
    assert_eq!(body["data"]["srcType"], 1);

    let (status, body) = get(&app, "/api/tasks?page=1&size=10").await;
    assert_eq!(status, StatusCode::OK);
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[1]["title"], "users replica");
    assert_eq!(tasks[1]["running"], false);
}

#[tokio::test]
async fn test_create_rejects_invalid_config() {
    let (_h, app) = app(ScriptedSource::new()).await;

    let (status, _) = post(&app, "/api/task", json!({"title": " ", "src": {"host": "h", "username": "u"}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/api/task",
        json!({
            "title": "bad dest",
            "src": {"host": "h", "username": "u"},
            "destinations": [{"name": "copy", "config": {"mappings": []}}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("copy"));

    let (_, body) = get(&app, "/api/tasks").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Start / stop
// =============================================================================

#[tokio::test]
async fn test_start_detail_stop() {
    let (h, app) = app(ScriptedSource::new().with_master(pos(1, 4))).await;

    let (status, body) = get(&app, "/api/task/start?id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "task starting");

    let source = h.source.clone();
    eventually("stream started", || {
        let source = source.clone();
        async move { !source.run_from_calls().is_empty() }
    })
    .await;

    let (_, body) = get(&app, "/api/task/start?id=1").await;
    assert_eq!(body["message"], "task already started");

    let (status, body) = get(&app, "/api/task?id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["running"], true);
    assert_eq!(body["data"]["instance"]["id"], 1);
    assert_eq!(body["data"]["sinkers"][0]["enabled"], true);
    assert_eq!(body["data"]["sinkers"][0]["config"]["destDatasource"]["password"], "***");

    let (_, body) = get(&app, "/api/task/stop?id=1").await;
    assert_eq!(body["message"], "task stopped");
    let (_, body) = get(&app, "/api/task/stop?id=1").await;
    assert_eq!(body["message"], "task not running");

    let (_, body) = get(&app, "/api/task?id=1").await;
    assert_eq!(body["data"]["running"], false);
    assert_eq!(body["data"]["position"], json!({"Name": "mysql-bin.000001", "Pos": 4}));
    assert_eq!(h.source.closes(), 1);
}

#[tokio::test]
async fn test_failed_start_reports_last_error() {
    let (h, app) = app(ScriptedSource::new()).await;

    let (_, body) = get(&app, "/api/task/start?id=1").await;
    assert_eq!(body["message"], "task starting");

    let registry = h.registry.clone();
    eventually("start failure recorded", || {
        let registry = registry.clone();
        async move { registry.last_error(1).is_some() }
    })
    .await;

    let (_, body) = get(&app, "/api/tasks").await;
    let task = &body["data"][0];
    assert_eq!(task["running"], false);
    assert!(task["lastError"].as_str().unwrap().contains("error getting position"));
}
