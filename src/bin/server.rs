use std::sync::Arc;

use anyhow::Context;
use reposcribe::{
    api::JobManager,
    web::{create_app, AppState},
    Config,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the bind address
const BIND_ENV: &str = "REPOSCRIBE_BIND";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::load().context("loading configuration")?;
    if let Ok(bind) = std::env::var(BIND_ENV) {
        if !bind.trim().is_empty() {
            config.server.bind = bind.trim().to_string();
        }
    }
    config.validate().await.context("validating configuration")?;
    let bind = config.server.bind.clone();

    let manager = Arc::new(JobManager::new(config));
    let _sweeper = manager.spawn_sweeper();

    info!("reposcribe web server starting...");
    info!("Reports directory: {}", manager.output_dir().display());
    info!("Workers: {}", manager.config().server.workers);
    if manager.config().gemini.api_key.is_none() {
        info!("GEMINI_API_KEY is not set; every submission must include an API key");
    }

    let app = create_app(AppState::new(manager));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("Server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
