// Stable error-kind vocabulary shared between the domain layer and the HTTP surface.

use serde::{Deserialize, Serialize};

/// Machine-readable error classification. Maps 1:1 to an HTTP status in
/// `mlm-api` (`NotFound`->404, `Busy`/`InsufficientMemory`->409,
/// `BadRequest`->400, `UpstreamUnavailable`/`Timeout`->503, `Internal`->500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Busy,
    InsufficientMemory,
    BadRequest,
    UpstreamUnavailable,
    Timeout,
    Internal,
}

/// JSON error body returned to HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_gb: Option<f64>,
}

impl ErrorResponse {
    pub fn simple(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            available_gb: None,
            required_gb: None,
        }
    }

    pub fn insufficient_memory(available_gb: f64, required_gb: f64) -> Self {
        Self {
            error: "insufficient_memory".to_string(),
            available_gb: Some(available_gb),
            required_gb: Some(required_gb),
        }
    }
}
