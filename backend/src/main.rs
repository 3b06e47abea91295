use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use guardian_backend::config::AppConfig;
use guardian_backend::{create_router, initialize_backend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app_state = initialize_backend(&config).await?;
    let shutdown = app_state.shutdown.clone();
    let app = create_router(app_state, &config.server)?;

    // Start the server
    let addr = config.bind_address();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
