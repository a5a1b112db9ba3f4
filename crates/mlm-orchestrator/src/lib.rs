pub mod context;
pub mod error;
mod fragment_parser;
pub mod model_client;
pub mod orchestrator;
pub mod sandbox_service;
pub mod search_service;
pub mod truncate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
pub use model_client::{ModelCaller, ModelClient, ModelClientError, ModelResponse, ToolSchema};
pub use orchestrator::{ChatOutcome, ToolOrchestrator, ToolsRequested};
pub use sandbox_service::{ExecuteResponse, SandboxBackend, SandboxServiceClient, SandboxToolDef};
pub use search_service::{SearchBackend, SearchResult, SearchServiceClient};
