use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};

/// GET /metrics: Prometheus text exposition of the shared registry.
pub async fn get_metrics(State(app): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let encoder = TextEncoder::new();
    let body = encoder.encode_to_string(&app.registry.gather())?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body))
}
