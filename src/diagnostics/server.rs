//! Diagnostics HTTP server: exposes health and per-cache stats on an
//! optional port, gated behind `CACHEMUX_DIAGNOSTIC_PORT`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::diagnostics::handlers::{cache_stats, health_check, invalidate_all};
use crate::CacheDriver;

pub fn router(driver: Arc<CacheDriver>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(cache_stats))
        .route("/invalidate", post(invalidate_all))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(driver)
}

/// Serve the diagnostics router on `addr` until the process exits. Intended
/// to be spawned as its own task alongside the real traffic the driver
/// handles; a bind failure is logged and swallowed rather than taking the
/// whole process down, since diagnostics are optional.
pub async fn serve(driver: Arc<CacheDriver>, addr: SocketAddr) {
    let app = router(driver);
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!(%addr, "diagnostics endpoint listening");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "diagnostics server exited");
            }
        }
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind diagnostics endpoint");
        }
    }
}
