use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use msgstore_protocol::Reply;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] msgstore_store::StoreError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Failures reach the caller only as "Processing error"; the detail is
/// logged here and never sent back.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Reply::processing_error()),
        )
            .into_response()
    }
}
