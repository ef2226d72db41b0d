//! Minimal liveness endpoint: every request gets `200 UP`

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Any path answers `UP` as `text/plain`
pub fn router() -> Router {
    Router::new().fallback(|| async { "UP" })
}

/// Bind the health listener on all interfaces and serve it in the background
pub async fn spawn(port: u16) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind health endpoint on port {}", port))?;
    log::info!("Health endpoint listening on port {}", port);
    Ok(serve(listener))
}

/// Serve the router on `listener` until the task is dropped
pub fn serve(listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            log::error!("Health endpoint error: {}", e);
        }
    })
}
