//! Error taxonomy for the streaming core (§7).
//!
//! `anyhow` remains the error type at the config/bootstrap boundary exactly as
//! the teacher uses it in `main.rs`; inside the core, handlers need to match
//! on *which* failure happened to pick an HTTP status, so it is a closed
//! `thiserror` enum instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("source file missing: {0}")]
    SourceMissing(String),

    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    #[error("readiness timeout waiting for first segment")]
    ReadinessTimeout,

    #[error("transcoder exited without producing output")]
    TranscoderExitedWithoutOutput,

    #[error("path escapes cache root")]
    PathEscape,

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StreamerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StreamerError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            StreamerError::SourceMissing(_) => StatusCode::NOT_FOUND,
            StreamerError::TranscoderUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StreamerError::ReadinessTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            StreamerError::TranscoderExitedWithoutOutput => StatusCode::INTERNAL_SERVER_ERROR,
            StreamerError::PathEscape => StatusCode::FORBIDDEN,
            StreamerError::SegmentNotFound(_) => StatusCode::NOT_FOUND,
            StreamerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StreamerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(error = %self, %status, "request failed");
        (status, self.to_string()).into_response()
    }
}
