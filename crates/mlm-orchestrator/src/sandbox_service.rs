// Client for the external SandboxService collaborator (spec.md §6).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SANDBOX_EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxToolDef {
    pub r#type: String,
    pub function: SandboxToolFunction,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    args: &'a Value,
    session_id: &'a str,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub exec_id: Option<String>,
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<SandboxToolDef>>;
    async fn execute(
        &self,
        tool_name: &str,
        args: &Value,
        session_id: &str,
    ) -> anyhow::Result<ExecuteResponse>;
}

#[derive(Clone)]
pub struct SandboxServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl SandboxServiceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SANDBOX_EXECUTE_TIMEOUT)
                .build()
                .expect("failed to build sandbox service client"),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("MLM_SANDBOX_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8092".to_string()),
        )
    }
}

#[async_trait]
impl SandboxBackend for SandboxServiceClient {
    async fn list_tools(&self) -> anyhow::Result<Vec<SandboxToolDef>> {
        let url = format!("{}/api/tools-openai", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("sandbox service tool manifest returned {}", response.status());
        }
        Ok(response.json().await?)
    }

    async fn execute(
        &self,
        tool_name: &str,
        args: &Value,
        session_id: &str,
    ) -> anyhow::Result<ExecuteResponse> {
        let url = format!("{}/api/execute/{tool_name}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ExecuteRequest { args, session_id })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("sandbox execute({tool_name}) returned {}", response.status());
        }
        Ok(response.json().await?)
    }
}
