//! Entry point for the visit billing engine binary.
//!
//! Running this binary starts an HTTP server that exposes the billing
//! API backed by an in-memory store.  The billing configuration file
//! may be specified via the `VISIT_CONFIG_PATH` environment variable;
//! if unset the server looks for a `billing.json` relative to the
//! current working directory and falls back to the built-in defaults
//! when no file exists.

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use visit_engine::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Determine where the billing configuration lives
    let config_path =
        std::env::var("VISIT_CONFIG_PATH").unwrap_or_else(|_| "billing.json".to_string());
    let config = visit_engine::config::load_config(&PathBuf::from(config_path))?;
    tracing::info!(rounding = config.rounding.strategy().name(), "billing configuration loaded");

    // Determine bind address
    let addr = std::env::var("VISIT_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    visit_engine::api::serve(&addr, config, Arc::new(MemoryStore::new())).await
}
