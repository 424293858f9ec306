//! Exam Proctor Backend Server

use std::net::SocketAddr;

use proctor_server::{build_orchestrator, create_router, AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "proctor_server=debug,proctor_core=info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Exam Proctor server starting ({})...", config.environment);
    if !config.is_production() {
        tracing::debug!("Detection config: {:?}", config.detection);
    }

    let orchestrator = build_orchestrator(&config).await?;
    tracing::info!("Providers: {:?}", orchestrator.providers());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = create_router(AppState::new(orchestrator, config));

    tracing::info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
