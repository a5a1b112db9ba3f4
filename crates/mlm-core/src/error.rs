// Domain error type for the lifecycle manager.
//
// Mirrors the error-kind vocabulary in `mlm_contracts::ErrorKind` one-for-one
// so the HTTP layer's status-code mapping is a pure match, never string
// sniffing.

use mlm_contracts::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("runtime busy: {0}")]
    Busy(String),

    #[error("insufficient memory: available {available_gb} GB, required {required_gb} GB")]
    InsufficientMemory { available_gb: f64, required_gb: f64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Busy(_) => ErrorKind::Busy,
            Error::InsufficientMemory { .. } => ErrorKind::InsufficientMemory,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
