pub mod error;
pub mod recorder;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use recorder::{record_chain_height, ChainMetrics};
pub use state::AppState;

/// Build the monitoring router. Used by `serve_monitoring()` and by the
/// integration tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(routes::metrics::get_metrics))
        .route("/health", get(routes::health::get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve monitoring on a pre-bound listener.
///
/// The listener is bound by the caller at startup so a bad address is a
/// setup error; serving only starts once the orchestrator has published an
/// endpoint.
pub async fn serve_monitoring(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let endpoint = state.endpoint.wait_published().await;
    tracing::info!(%addr, %endpoint, "monitoring server listening");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
