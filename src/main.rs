//! cachemux: a transparent query-result caching driver shim.
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - CACHEMUX_SCHEMA: path to the DDL file describing the wrapped schema
//! - CACHEMUX_PLAN: path to the cache plan YAML document
//! - CACHEMUX_DSN: MySQL-compatible connection string to wrap
//! - CACHEMUX_DIAGNOSTIC_PORT: if set, serves /health and /stats on this port
//! - RUST_LOG: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use cachemux::diagnostics;
use cachemux::driver::CacheDriver;
use cachemux::plan::{parse_plan, read_schema, CacheCatalog};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachemux=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let schema_path = std::env::var("CACHEMUX_SCHEMA")
        .map_err(|_| "CACHEMUX_SCHEMA must be set to a schema DDL file path")?;
    let plan_path = std::env::var("CACHEMUX_PLAN")
        .map_err(|_| "CACHEMUX_PLAN must be set to a cache plan YAML file path")?;
    let dsn = std::env::var("CACHEMUX_DSN")
        .map_err(|_| "CACHEMUX_DSN must be set to a MySQL-compatible connection string")?;

    tracing::info!(path = %schema_path, "loading schema");
    let schema_ddl = std::fs::read_to_string(&schema_path)?;
    let schema = read_schema(&schema_ddl)?;

    tracing::info!(path = %plan_path, "loading cache plan");
    let plan_yaml = std::fs::read_to_string(&plan_path)?;
    let plan = parse_plan(&plan_yaml)?;

    let catalog = CacheCatalog::compile(&plan, &schema)?;
    tracing::info!(
        tables = catalog.tables().count(),
        "compiled cache plan catalog"
    );

    let driver = Arc::new(CacheDriver::new(catalog, schema));

    if let Some(port) = std::env::var("CACHEMUX_DIAGNOSTIC_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
    {
        let diagnostics_driver = driver.clone();
        tokio::spawn(async move {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            diagnostics::serve(diagnostics_driver, addr).await;
        });
    }

    let conn = driver.open(&dsn).await?;
    conn.ping().await?;
    tracing::info!("connected to underlying database, cache driver ready");

    std::future::pending::<()>().await;
    Ok(())
}
