// Chat completions route (spec.md §6 "Chat"). Input is OpenAI-style
// messages; the heavy lifting is the bounded tool loop in
// `mlm_orchestrator::ToolOrchestrator`, not this handler.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use mlm_contracts::ChatTurn;
use mlm_orchestrator::ToolsRequested;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tools: ToolsRequestDto,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsRequestDto {
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub sandbox: bool,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Json<mlm_orchestrator::ChatOutcome>, ApiError> {
    let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let tools_requested = ToolsRequested {
        web_search: req.tools.web_search,
        sandbox: req.tools.sandbox,
    };

    let outcome = state
        .orchestrator
        .chat(&req.model, req.messages, tools_requested, &session_id)
        .await?;

    Ok(Json(outcome))
}
