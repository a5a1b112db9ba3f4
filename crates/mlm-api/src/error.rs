// Maps domain errors to the stable HTTP contract in spec.md §7: every
// `ErrorKind` has exactly one status code, regardless of which crate raised it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mlm_contracts::{ErrorKind, ErrorResponse};

pub struct ApiError {
    kind: ErrorKind,
    body: ErrorResponse,
}

impl From<mlm_core::Error> for ApiError {
    fn from(err: mlm_core::Error) -> Self {
        let kind = err.kind();
        let body = match &err {
            mlm_core::Error::InsufficientMemory {
                available_gb,
                required_gb,
            } => ErrorResponse::insufficient_memory(*available_gb, *required_gb),
            _ => ErrorResponse::simple(err.to_string()),
        };
        Self { kind, body }
    }
}

impl From<mlm_orchestrator::Error> for ApiError {
    fn from(err: mlm_orchestrator::Error) -> Self {
        Self {
            kind: err.kind(),
            body: ErrorResponse::simple(err.to_string()),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Busy | ErrorKind::InsufficientMemory => StatusCode::CONFLICT,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamUnavailable | ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(self.kind), Json(self.body)).into_response()
    }
}
