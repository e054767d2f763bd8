//! HTTP delivery surface: validates JSON requests and classifies them with
//! a shared [`InferenceAdapter`](sidefx_ai::InferenceAdapter).

mod error;
mod handlers;

pub use error::RequestError;
pub use handlers::{AppState, build_router, raw_fields_from_json};

use std::sync::Arc;

use tracing::info;

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        listen_addr = %listener.local_addr()?,
        model_ready = state.adapter.is_ready(),
        "HTTP server listening"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await
}
