//! Attendance anomaly detection service binary.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendai_rs::config::ServiceConfig;
use attendai_rs::detect::AnomalyEngine;
use attendai_rs::store::RealtimeDbStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attendai_rs=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match RealtimeDbStore::new(
        config.store.base_url.clone(),
        config.store.timeout_seconds,
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to build record store client: {}", e);
            std::process::exit(1);
        }
    };

    let engine = Arc::new(AnomalyEngine::new(store));

    let addr = config
        .server
        .bind_addr
        .unwrap_or_else(|| "0.0.0.0:8000".to_string());

    tracing::info!("AttendAI anomaly detection service starting...");
    tracing::info!("Record store: {}", config.store.base_url);

    if let Err(e) = attendai_rs::http_server::serve(&addr, engine).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
