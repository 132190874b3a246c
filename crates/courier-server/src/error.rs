use axum::http::StatusCode;
use thiserror::Error;

use courier_backend::BackendError;
use courier_core::UrnError;

/// Errors an inbound handler can produce.
///
/// Everything except backend failures answers 400 so the provider sees a
/// definitive rejection; backend failures answer 500 so it retries.
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("{0}")]
    Validation(String),

    #[error("unable to parse request: {0}")]
    Decode(String),

    #[error("invalid signature: {0}")]
    Signature(String),

    #[error("unknown status code: {0}")]
    UnknownStatus(String),

    #[error("invalid urn: {0}")]
    Urn(#[from] UrnError),

    #[error("channel not found")]
    ChannelNotFound,

    #[error("backend error: {0}")]
    Backend(String),
}

impl ReceiveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReceiveError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<BackendError> for ReceiveError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ChannelNotFound => ReceiveError::ChannelNotFound,
            other => ReceiveError::Backend(other.to_string()),
        }
    }
}
