// Lifecycle HTTP routes (spec.md §6 "Lifecycle").

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use mlm_contracts::RuntimeView;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/models/:id", get(get_model))
        .route("/api/models/:id/start", post(start_model))
        .route("/api/models/:id/stop", post(stop_model))
        .with_state(state)
}

async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<RuntimeView>>, ApiError> {
    let views = state.engine.list().await?;
    Ok(Json(views))
}

async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RuntimeView>, ApiError> {
    let view = state.engine.get(&id).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    #[serde(default)]
    force: bool,
}

async fn start_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StartQuery>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.engine.start(&id, query.force).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))))
}

async fn stop_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.engine.stop(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "accepted"}))))
}
