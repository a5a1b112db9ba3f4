// ToolOrchestrator: the bounded `model -> tools -> model -> ...` loop
// (spec.md §4.7). Request-scoped and stateless between calls — everything it
// needs lives in the `messages` vector and the services it was built with.
//
// Grounded on `everruns-core::executor::AgentLoop::run`'s iteration-counter
// loop shape (call LLM, check for tool calls, execute, append, continue or
// break), generalized from a single durable session to a bounded,
// non-persisted request.

use std::sync::Arc;

use futures::future::join_all;
use mlm_contracts::{ChatRole, ChatTurn, ToolCall, ToolResult};
use mlm_core::LifecycleEngine;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::{compact, estimate_input_tokens, needs_compaction, safe_max_output_tokens};
use crate::error::{Error, Result};
use crate::model_client::{ModelCaller, ToolSchema};
use crate::sandbox_service::{ExecuteResponse, SandboxBackend};
use crate::search_service::{SearchBackend, SearchResult};
use crate::truncate::{truncate_payload, DEFAULT_TRUNCATION_BUDGET};

pub const MAX_TOOL_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolsRequested {
    pub web_search: bool,
    pub sandbox: bool,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct ChatOutcome {
    pub final_content: String,
    pub search_results: Vec<SearchResult>,
    pub sandbox_outputs: Vec<ExecuteResponse>,
    pub iterations: u32,
    pub iteration_cap_hit: bool,
}

enum Extra {
    None,
    Search(Vec<SearchResult>),
    Sandbox(ExecuteResponse),
}

pub struct ToolOrchestrator {
    engine: Arc<LifecycleEngine>,
    model_client: Arc<dyn ModelCaller>,
    search: Arc<dyn SearchBackend>,
    sandbox: Arc<dyn SandboxBackend>,
}

fn web_search_schema() -> ToolSchema {
    ToolSchema {
        name: "web_search".to_string(),
        description: "Search the web and return titled snippets.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"],
        }),
    }
}

fn build_tool_result(tool_call_id: String, raw: std::result::Result<String, String>) -> ToolResult {
    match raw {
        Ok(text) => {
            let truncated_text = truncate_payload(&text, DEFAULT_TRUNCATION_BUDGET);
            let was_truncated = truncated_text.chars().count() != text.chars().count();
            ToolResult {
                tool_call_id,
                result: Some(Value::String(truncated_text)),
                error: None,
                truncated: was_truncated,
            }
        }
        Err(e) => ToolResult {
            tool_call_id,
            result: None,
            error: Some(e),
            truncated: false,
        },
    }
}

impl ToolOrchestrator {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        model_client: Arc<dyn ModelCaller>,
        search: Arc<dyn SearchBackend>,
        sandbox: Arc<dyn SandboxBackend>,
    ) -> Self {
        Self {
            engine,
            model_client,
            search,
            sandbox,
        }
    }

    async fn dispatch_one(
        &self,
        call: &ToolCall,
        session_id: &str,
        sandbox_available: bool,
    ) -> (ToolResult, Extra) {
        if call.name == "web_search" {
            let query = call
                .arguments
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return match self.search.search(&query).await {
                Ok(results) => {
                    let text = serde_json::to_string(&results).unwrap_or_default();
                    (build_tool_result(call.id.clone(), Ok(text)), Extra::Search(results))
                }
                Err(e) => (build_tool_result(call.id.clone(), Err(e.to_string())), Extra::None),
            };
        }

        if sandbox_available {
            return match self.sandbox.execute(&call.name, &call.arguments, session_id).await {
                Ok(resp) if resp.success => {
                    let text = resp.output.clone().unwrap_or_default();
                    (build_tool_result(call.id.clone(), Ok(text)), Extra::Sandbox(resp))
                }
                Ok(resp) => {
                    let err = resp.error.clone().unwrap_or_else(|| "sandbox execution failed".to_string());
                    (build_tool_result(call.id.clone(), Err(err)), Extra::Sandbox(resp))
                }
                Err(e) => (build_tool_result(call.id.clone(), Err(e.to_string())), Extra::None),
            };
        }

        (
            build_tool_result(call.id.clone(), Err(format!("unknown tool: {}", call.name))),
            Extra::None,
        )
    }

    fn resolve_tool_calls(content: &str, structured: Option<Vec<ToolCall>>) -> Vec<ToolCall> {
        match structured {
            Some(calls) if !calls.is_empty() => calls,
            _ => crate::fragment_parser::parse_tagged_fragments(content),
        }
    }

    pub async fn chat(
        &self,
        model_id: &str,
        mut messages: Vec<ChatTurn>,
        tools_requested: ToolsRequested,
        session_id: &str,
    ) -> Result<ChatOutcome> {
        let runtime = self.engine.get(model_id).await.map_err(|e| match e {
            mlm_core::Error::NotFound(_) => Error::NotFound(e.to_string()),
            other => Error::NotReady(other.to_string()),
        })?;
        if runtime.status != mlm_contracts::ModelState::Running {
            return Err(Error::NotReady(format!(
                "model {model_id} is not running (state={:?})",
                runtime.status
            )));
        }
        let port = runtime.port;
        let max_context_tokens = runtime.max_context_length.unwrap_or(0);

        let mut tool_schemas = Vec::new();
        if tools_requested.web_search {
            tool_schemas.push(web_search_schema());
        }
        let sandbox_defs = if tools_requested.sandbox {
            match self.sandbox.list_tools().await {
                Ok(defs) => defs,
                Err(e) => {
                    warn!(error = %e, "failed to fetch sandbox tool manifest; sandbox tools unavailable");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        for def in &sandbox_defs {
            tool_schemas.push(ToolSchema {
                name: def.function.name.clone(),
                description: def.function.description.clone(),
                parameters: def.function.parameters.clone(),
            });
        }
        let sandbox_available = !sandbox_defs.is_empty();

        let mut outcome = ChatOutcome::default();

        loop {
            outcome.iterations += 1;

            let estimated_input = estimate_input_tokens(&messages);
            if needs_compaction(estimated_input, max_context_tokens) {
                info!(model = %model_id, "compacting chat context before model call");
                messages = compact(&messages, self.model_client.as_ref(), port, model_id).await;
            }
            let estimated_input = estimate_input_tokens(&messages);
            let max_output_tokens = safe_max_output_tokens(max_context_tokens, estimated_input);

            let response = self
                .model_client
                .chat_completion(port, model_id, &messages, &tool_schemas, max_output_tokens)
                .await
                .map_err(|e| Error::ModelUnavailable(e.to_string()))?;

            outcome.final_content = response.content.clone();

            let tool_calls = Self::resolve_tool_calls(&response.content, response.tool_calls);
            if tool_calls.is_empty() {
                break;
            }

            let dispatched: Vec<(ToolResult, Extra)> = join_all(
                tool_calls
                    .iter()
                    .map(|call| self.dispatch_one(call, session_id, sandbox_available)),
            )
            .await;

            for (_, extra) in &dispatched {
                match extra {
                    Extra::Search(results) => outcome.search_results.extend(results.clone()),
                    Extra::Sandbox(resp) => outcome.sandbox_outputs.push(resp.clone()),
                    Extra::None => {}
                }
            }

            messages.push(ChatTurn {
                role: ChatRole::Assistant,
                content: response.content,
                tool_calls: Some(tool_calls.clone()),
                tool_call_id: None,
            });
            for (call, (result, _)) in tool_calls.iter().zip(dispatched.into_iter()) {
                let content = match (&result.result, &result.error) {
                    (Some(Value::String(s)), _) => s.clone(),
                    (Some(v), _) => v.to_string(),
                    (None, Some(e)) => format!("error: {e}"),
                    (None, None) => String::new(),
                };
                messages.push(ChatTurn {
                    role: ChatRole::Tool,
                    content,
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                });
            }

            if outcome.iterations >= MAX_TOOL_ITERATIONS {
                warn!(model = %model_id, "tool loop iteration cap reached");
                outcome.iteration_cap_hit = true;
                break;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mlm_contracts::{ChatRole, EngineKind, ModelSpec};
    use mlm_core::testing::{FakeContainerDriver, FakeHealthProber};
    use mlm_core::{Catalog, MemoryGuard};

    use super::*;
    use crate::testing::{FakeModelCaller, FakeSandboxBackend, FakeSearchBackend};

    fn running_engine() -> Arc<LifecycleEngine> {
        let spec = ModelSpec {
            id: "m1".to_string(),
            display_name: "m1".to_string(),
            engine_kind: EngineKind::Vllm,
            endpoint_port: 8100,
            container_name: "m1-container".to_string(),
            start_command: vec!["noop-start".to_string()],
            stop_command: vec![],
            estimated_memory_gb: Some(4.0),
            max_context_tokens: 8192,
            supports_tools: true,
            tool_call_parser: None,
            startup_timeout_seconds: 30,
            health_probe_interval_seconds: 1,
        };
        let catalog = Catalog::from_specs(vec![spec]).unwrap();
        let engine = Arc::new(LifecycleEngine::new(
            &catalog,
            Arc::new(FakeContainerDriver::default()),
            Arc::new(FakeHealthProber::always_ok()),
            MemoryGuard::new(),
        ));
        engine
    }

    fn user_message(content: &str) -> ChatTurn {
        ChatTurn {
            role: ChatRole::User,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[tokio::test]
    async fn tool_loop_is_bounded_at_max_iterations() {
        let engine = running_engine();
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let model = Arc::new(FakeModelCaller::always_calls_tool(
            "web_search",
            serde_json::json!({"query": "x"}),
        ));
        let search = Arc::new(FakeSearchBackend::instant());
        let sandbox = Arc::new(FakeSandboxBackend::instant());

        let orchestrator = ToolOrchestrator::new(engine, model.clone(), search.clone(), sandbox);
        let outcome = orchestrator
            .chat(
                "m1",
                vec![user_message("hello")],
                ToolsRequested { web_search: true, sandbox: false },
                "session-1",
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations, MAX_TOOL_ITERATIONS);
        assert!(outcome.iteration_cap_hit);
        assert_eq!(model.calls_made(), MAX_TOOL_ITERATIONS);
        assert_eq!(search.calls_made(), MAX_TOOL_ITERATIONS);
    }

    #[tokio::test]
    async fn tool_loop_exits_once_model_stops_calling_tools() {
        let engine = running_engine();
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let model = Arc::new(FakeModelCaller::calls_tool_then_answers(
            "web_search",
            serde_json::json!({"query": "x"}),
            2,
            "final answer",
        ));
        let search = Arc::new(FakeSearchBackend::instant());
        let sandbox = Arc::new(FakeSandboxBackend::instant());

        let orchestrator = ToolOrchestrator::new(engine, model.clone(), search.clone(), sandbox);
        let outcome = orchestrator
            .chat(
                "m1",
                vec![user_message("hello")],
                ToolsRequested { web_search: true, sandbox: false },
                "session-1",
            )
            .await
            .unwrap();

        assert_eq!(outcome.iterations, 3);
        assert!(!outcome.iteration_cap_hit);
        assert_eq!(outcome.final_content, "final answer");
        assert_eq!(search.calls_made(), 2);
    }

    #[tokio::test]
    async fn parallel_tool_calls_fan_out_concurrently_in_original_order() {
        let engine = running_engine();
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        struct TwoCallThenDone;
        #[async_trait::async_trait]
        impl ModelCaller for TwoCallThenDone {
            async fn chat_completion(
                &self,
                _port: u16,
                _model_id: &str,
                messages: &[ChatTurn],
                _tools: &[ToolSchema],
                _max_output_tokens: u32,
            ) -> std::result::Result<crate::model_client::ModelResponse, crate::model_client::ModelClientError> {
                let has_tool_results = messages.iter().any(|m| m.role == ChatRole::Tool);
                if has_tool_results {
                    Ok(crate::model_client::ModelResponse {
                        content: "done".to_string(),
                        tool_calls: None,
                    })
                } else {
                    Ok(crate::model_client::ModelResponse {
                        content: String::new(),
                        tool_calls: Some(vec![
                            ToolCall {
                                id: "call-1".to_string(),
                                name: "run".to_string(),
                                arguments: serde_json::json!({}),
                            },
                            ToolCall {
                                id: "call-2".to_string(),
                                name: "web_search".to_string(),
                                arguments: serde_json::json!({"query": "x"}),
                            },
                        ]),
                    })
                }
            }
        }

        let model = Arc::new(TwoCallThenDone);
        let delay = Duration::from_millis(200);
        let search = Arc::new(FakeSearchBackend::with_delay(delay));
        let sandbox = Arc::new(FakeSandboxBackend::with_delay(delay));

        let orchestrator = ToolOrchestrator::new(engine, model, search, sandbox);
        let started = std::time::Instant::now();
        let outcome = orchestrator
            .chat(
                "m1",
                vec![user_message("hello")],
                ToolsRequested { web_search: true, sandbox: true },
                "session-1",
            )
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.final_content, "done");
        assert_eq!(outcome.sandbox_outputs.len(), 1);
        assert_eq!(outcome.search_results.len(), 1);
        assert!(
            elapsed < delay * 2,
            "expected concurrent dispatch to take ~1 delay, took {elapsed:?}"
        );
    }
}
