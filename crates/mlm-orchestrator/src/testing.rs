// Shared test fakes for ModelCaller, SearchBackend and SandboxBackend.
//
// Mirrors `mlm_core::testing`'s fake pattern so mlm-api's integration tests
// can drive the full tool loop (spec.md §8 scenarios 5 and 6) without a
// live model, search, or sandbox service.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mlm_contracts::{ChatTurn, ToolCall};
use serde_json::Value;

use crate::model_client::{ModelCaller, ModelClientError, ModelResponse, ToolSchema};
use crate::sandbox_service::{ExecuteResponse, SandboxBackend, SandboxToolDef, SandboxToolFunction};
use crate::search_service::{SearchBackend, SearchResult};

/// Returns a fixed tool call for the first `tool_call_rounds` invocations,
/// then a plain content-only response with no tool calls. Set
/// `tool_call_rounds` to `u32::MAX` to always request the tool (used to
/// exercise the `MAX_TOOL_ITERATIONS` cap in spec.md §8 scenario 5).
pub struct FakeModelCaller {
    calls: AtomicU32,
    tool_call_rounds: u32,
    tool_name: String,
    tool_arguments: Value,
    final_content: String,
}

impl FakeModelCaller {
    pub fn always_calls_tool(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            calls: AtomicU32::new(0),
            tool_call_rounds: u32::MAX,
            tool_name: tool_name.into(),
            tool_arguments: arguments,
            final_content: String::new(),
        }
    }

    pub fn calls_tool_then_answers(
        tool_name: impl Into<String>,
        arguments: Value,
        rounds: u32,
        final_content: impl Into<String>,
    ) -> Self {
        Self {
            calls: AtomicU32::new(0),
            tool_call_rounds: rounds,
            tool_name: tool_name.into(),
            tool_arguments: arguments,
            final_content: final_content.into(),
        }
    }

    pub fn calls_made(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelCaller for FakeModelCaller {
    async fn chat_completion(
        &self,
        _port: u16,
        _model_id: &str,
        _messages: &[ChatTurn],
        _tools: &[ToolSchema],
        _max_output_tokens: u32,
    ) -> Result<ModelResponse, ModelClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.tool_call_rounds {
            Ok(ModelResponse {
                content: String::new(),
                tool_calls: Some(vec![ToolCall {
                    id: format!("call-{call}"),
                    name: self.tool_name.clone(),
                    arguments: self.tool_arguments.clone(),
                }]),
            })
        } else {
            Ok(ModelResponse {
                content: self.final_content.clone(),
                tool_calls: None,
            })
        }
    }
}

/// Scriptable search backend that returns one fixed result, optionally
/// after an artificial delay so tests can assert on parallel fan-out timing.
pub struct FakeSearchBackend {
    calls: AtomicU32,
    delay: Duration,
}

impl FakeSearchBackend {
    pub fn instant() -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
        }
    }

    pub fn calls_made(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for FakeSearchBackend {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![SearchResult {
            title: format!("result for {query}"),
            url: "https://example.invalid/result".to_string(),
            snippet: "a fake search snippet".to_string(),
        }])
    }
}

/// Scriptable sandbox backend exposing one tool, `run`, that always
/// succeeds, optionally after an artificial delay.
pub struct FakeSandboxBackend {
    calls: AtomicU32,
    delay: Duration,
}

impl FakeSandboxBackend {
    pub fn instant() -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
        }
    }

    pub fn calls_made(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxBackend for FakeSandboxBackend {
    async fn list_tools(&self) -> anyhow::Result<Vec<SandboxToolDef>> {
        Ok(vec![SandboxToolDef {
            r#type: "function".to_string(),
            function: SandboxToolFunction {
                name: "run".to_string(),
                description: "Run a fake sandbox tool.".to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
        }])
    }

    async fn execute(
        &self,
        _tool_name: &str,
        _args: &Value,
        _session_id: &str,
    ) -> anyhow::Result<ExecuteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ExecuteResponse {
            success: true,
            output: Some("fake sandbox output".to_string()),
            error: None,
            execution_time: Some(0.0),
            exec_id: Some("fake-exec".to_string()),
        })
    }
}
