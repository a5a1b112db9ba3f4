// End-to-end HTTP tests driven entirely by fakes — no Docker, model, search,
// or sandbox service required. Exercises the spec.md §8 scenarios at the
// HTTP boundary via `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use mlm_api::{build_app, AppState};
use mlm_contracts::{EngineKind, ModelSpec, ModelState, RuntimeView};
use mlm_core::testing::{FakeContainerDriver, FakeHealthProber};
use mlm_core::{Catalog, LifecycleEngine, MemoryGuard};
use mlm_orchestrator::testing::{FakeModelCaller, FakeSandboxBackend, FakeSearchBackend};
use mlm_orchestrator::ToolOrchestrator;
use serde_json::{json, Value};
use tower::ServiceExt;

fn spec(id: &str, port: u16) -> ModelSpec {
    ModelSpec {
        id: id.to_string(),
        display_name: id.to_string(),
        engine_kind: EngineKind::Vllm,
        endpoint_port: port,
        container_name: format!("{id}-container"),
        start_command: vec!["noop-start".to_string(), id.to_string()],
        stop_command: vec![],
        estimated_memory_gb: Some(4.0),
        max_context_tokens: 8192,
        supports_tools: true,
        tool_call_parser: None,
        startup_timeout_seconds: 30,
        health_probe_interval_seconds: 1,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn test_state() -> AppState {
    let catalog = Catalog::from_specs(vec![spec("m1", 8100)]).unwrap();
    let engine = Arc::new(LifecycleEngine::new(
        &catalog,
        Arc::new(FakeContainerDriver::default()),
        Arc::new(FakeHealthProber::always_ok()),
        MemoryGuard::new(),
    ));
    let orchestrator = Arc::new(ToolOrchestrator::new(
        engine.clone(),
        Arc::new(FakeModelCaller::calls_tool_then_answers(
            "web_search",
            json!({"query": "x"}),
            0,
            "hello from the model",
        )),
        Arc::new(FakeSearchBackend::instant()),
        Arc::new(FakeSandboxBackend::instant()),
    ));
    AppState { engine, orchestrator }
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = build_app(test_state());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn list_models_returns_catalog_in_order() {
    let app = build_app(test_state());
    let response = app
        .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let views: Vec<RuntimeView> = serde_json::from_value(body).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, "m1");
    assert_eq!(views[0].status, ModelState::Stopped);
}

#[tokio::test]
async fn get_unknown_model_is_404() {
    let app = build_app(test_state());
    let response = app
        .oneshot(
            Request::get("/api/models/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_then_stop_round_trip() {
    let app = build_app(test_state());

    let start = app
        .clone()
        .oneshot(
            Request::post("/api/models/m1/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start.status(), StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let get = app
        .clone()
        .oneshot(
            Request::get("/api/models/m1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(get).await;
    let view: RuntimeView = serde_json::from_value(body).unwrap();
    assert_eq!(view.status, ModelState::Running);

    let stop = app
        .clone()
        .oneshot(
            Request::post("/api/models/m1/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stop.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn start_rejects_insufficient_memory_with_409() {
    let catalog = Catalog::from_specs(vec![{
        let mut s = spec("m1", 8100);
        s.estimated_memory_gb = Some(f64::MAX / 4.0);
        s
    }])
    .unwrap();
    let engine = Arc::new(LifecycleEngine::new(
        &catalog,
        Arc::new(FakeContainerDriver::default()),
        Arc::new(FakeHealthProber::always_ok()),
        MemoryGuard::new(),
    ));
    let orchestrator = Arc::new(ToolOrchestrator::new(
        engine.clone(),
        Arc::new(FakeModelCaller::calls_tool_then_answers(
            "web_search",
            json!({}),
            0,
            "ok",
        )),
        Arc::new(FakeSearchBackend::instant()),
        Arc::new(FakeSandboxBackend::instant()),
    ));
    let app = build_app(AppState { engine, orchestrator });

    let response = app
        .oneshot(
            Request::post("/api/models/m1/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "insufficient_memory");
}

#[tokio::test]
async fn chat_completions_rejects_model_that_is_not_running() {
    let app = build_app(test_state());
    let response = app
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "model": "m1",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn chat_completions_runs_tool_loop_once_model_is_running() {
    let app = build_app(test_state());
    app.clone()
        .oneshot(
            Request::post("/api/models/m1/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = app
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "model": "m1",
                        "messages": [{"role": "user", "content": "hi"}],
                        "tools": {"web_search": true},
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["final_content"], "hello from the model");
}
