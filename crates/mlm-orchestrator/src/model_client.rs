// Client for the model's own OpenAI-compatible `/v1/chat/completions`.
//
// Non-streaming — spec.md §4.7 does not require streaming, and draining a
// stream just to re-assemble one `choices[0].message` adds nothing here.
// Wire shapes are grounded on `everruns-core::openai`'s `OpenAiMessage` /
// `OpenAiTool` / `OpenAiToolCall` family; this client just isn't generic
// over provider since there is exactly one kind of upstream.

use std::time::Duration;

use async_trait::async_trait;
use mlm_contracts::{ChatTurn, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MODEL_CALL_TIMEOUT: Duration = Duration::from_secs(1800);
const PROBE_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ModelClientError {
    #[error("transport error calling model: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    r#type: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    tool_choice: &'static str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireResponseFunctionCall {
    name: String,
    arguments: String,
}

pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Abstraction over "call the model's chat-completions endpoint" so the
/// orchestrator's loop can be driven by a fake in tests, the same way
/// `mlm_core::ContainerDriver`/`HealthProber` are.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn chat_completion(
        &self,
        port: u16,
        model_id: &str,
        messages: &[ChatTurn],
        tools: &[ToolSchema],
        max_output_tokens: u32,
    ) -> Result<ModelResponse, ModelClientError>;
}

#[derive(Clone)]
pub struct ModelClient {
    client: reqwest::Client,
}

impl ModelClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(MODEL_CALL_TIMEOUT)
                .build()
                .expect("failed to build model client"),
        }
    }

    fn to_wire_message(turn: &ChatTurn) -> WireMessage {
        WireMessage {
            role: match turn.role {
                mlm_contracts::ChatRole::System => "system",
                mlm_contracts::ChatRole::User => "user",
                mlm_contracts::ChatRole::Assistant => "assistant",
                mlm_contracts::ChatRole::Tool => "tool",
            }
            .to_string(),
            content: Some(turn.content.clone()),
            tool_calls: turn.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| WireToolCall {
                        id: tc.id.clone(),
                        r#type: "function",
                        function: WireFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: turn.tool_call_id.clone(),
        }
    }
}

#[async_trait]
impl ModelCaller for ModelClient {
    async fn chat_completion(
        &self,
        port: u16,
        model_id: &str,
        messages: &[ChatTurn],
        tools: &[ToolSchema],
        max_output_tokens: u32,
    ) -> Result<ModelResponse, ModelClientError> {
        let wire_tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| WireTool {
                        r#type: "function",
                        function: WireFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let request = WireRequest {
            model: model_id.to_string(),
            messages: messages.iter().map(Self::to_wire_message).collect(),
            tools: wire_tools,
            tool_choice: "auto",
            max_tokens: max_output_tokens,
        };

        let url = format!("http://{PROBE_HOST}:{port}/v1/chat/completions");
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelClientError::Upstream { status, body });
        }

        let parsed: WireResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelClientError::Upstream {
                status: 200,
                body: "model response had no choices".to_string(),
            })?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or(serde_json::json!({})),
                })
                .collect()
        });

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

impl Default for ModelClient {
    fn default() -> Self {
        Self::new()
    }
}
