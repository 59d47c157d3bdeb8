//! Runner Allocator - CI runner allocation and test planning service

use allocator_lib::{DecisionLogger, ResourceCatalog};
use anyhow::Result;
use runner_allocator::{
    api::{self, AppState, RequestDefaults},
    config::ServiceConfig,
    health::{components, HealthRegistry},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting runner-allocator");

    let config = ServiceConfig::load()?;
    info!(
        instance = %config.instance_name,
        default_policy = %config.default_policy,
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::CATALOG).await;

    // A broken catalog file degrades the service instead of keeping it down
    let catalog = match config.load_catalog() {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Falling back to built-in catalog");
            health_registry
                .set_degraded(components::CATALOG, format!("{e:#}"))
                .await;
            ResourceCatalog::builtin()
        }
    };

    let logger = DecisionLogger::new(&config.instance_name);
    logger.log_startup(SERVICE_VERSION, catalog.len());

    let state = Arc::new(AppState::new(
        catalog,
        RequestDefaults::from(&config),
        health_registry.clone(),
        logger.clone(),
    ));
    health_registry.set_ready(true).await;

    let server = tokio::spawn(api::serve(config.api_port, state));

    tokio::select! {
        result = server => {
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
