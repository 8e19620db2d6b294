use crate::state::AppState;
use axum::extract::State;
use axum::Json;

/// GET /health: liveness plus the endpoint currently receiving traffic.
pub async fn get_health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let endpoint = app.endpoint.current().map(|e| e.to_string());
    Json(serde_json::json!({
        "status": "ok",
        "endpoint": endpoint,
    }))
}
