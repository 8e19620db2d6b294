use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures surfaced by the monitoring handlers. All map to 500.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
