//! HTTP handlers for the diagnostics endpoint: plain `Json<T>` responses
//! built from `#[derive(Serialize)]` structs, no request body to speak of.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::cache::CacheEntryStats;
use crate::CacheDriver;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub caches: Vec<CacheEntryStats>,
    pub observed_queries: Vec<String>,
}

pub async fn cache_stats(State(driver): State<Arc<CacheDriver>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        caches: driver.registry.all_stats(),
        observed_queries: driver.catalog.observed_queries().map(String::from).collect(),
    })
}

#[derive(Serialize)]
pub struct InvalidateResponse {
    pub invalidated: bool,
}

/// Purge every cache, the same fallback the invalidation engine uses for an
/// unrecognized mutating query.
pub async fn invalidate_all(State(driver): State<Arc<CacheDriver>>) -> Json<InvalidateResponse> {
    crate::invalidate::purge_all(&driver.registry).apply(crate::clock::now_ns());
    Json(InvalidateResponse { invalidated: true })
}
