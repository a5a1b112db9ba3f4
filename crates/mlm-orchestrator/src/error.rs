use mlm_contracts::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("model not ready: {0}")]
    NotReady(String),

    #[error("model transport failure: {0}")]
    ModelUnavailable(String),

    #[error("{0}")]
    BadRequest(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotReady(_) => ErrorKind::UpstreamUnavailable,
            Error::ModelUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Error::BadRequest(_) => ErrorKind::BadRequest,
        }
    }
}
