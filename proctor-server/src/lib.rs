//! Exam Proctor Backend
//!
//! HTTP surface over the proctoring core: frame and audio uploads go to the
//! detectors, alerts land in the journal, face references in the face store.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    EXAM PROCTOR API                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────────────────────────────┐  │
//! │  │  Axum     │──▶│  ProctoringOrchestrator            │  │
//! │  │  Handlers │   │  head / face / objects / audio     │  │
//! │  └───────────┘   └──────────────┬─────────────────────┘  │
//! │                                 ▼                        │
//! │            ┌───────────────────────────────────┐         │
//! │            │ PostgreSQL │ JSONL file │ memory  │         │
//! │            └───────────────────────────────────┘         │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use proctor_core::{
    AlertJournal, FaceReferenceStore, JsonlAlertJournal, MemoryAlertJournal, MemoryFaceStore,
    ProctoringOrchestrator, ProviderSet,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

pub use config::Config;
pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProctoringOrchestrator>,
    pub config: Config,
}

impl AppState {
    pub fn new(orchestrator: ProctoringOrchestrator, config: Config) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            config,
        }
    }
}

/// Pick stores from the configuration: PostgreSQL when `DATABASE_URL` is
/// set, otherwise a JSONL journal if `JOURNAL_PATH` is set, otherwise memory.
pub async fn build_orchestrator(config: &Config) -> anyhow::Result<ProctoringOrchestrator> {
    let detection = config.detection.clone();
    let providers = ProviderSet::from_config(&detection.models, &detection.objects.person_label);

    let (faces, journal): (Arc<dyn FaceReferenceStore>, Arc<dyn AlertJournal>) =
        if let Some(url) = &config.database_url {
            tracing::info!("Database: {}", url.split('@').last().unwrap_or("***"));
            let pool = db::create_pool(url).await?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;

            (
                Arc::new(models::PgFaceStore::new(pool.clone())),
                Arc::new(models::PgAlertJournal::new(pool)),
            )
        } else if let Some(path) = &config.journal_path {
            tracing::info!("Alert journal: {}", path.display());
            (Arc::new(MemoryFaceStore::new()), Arc::new(JsonlAlertJournal::open(path)?))
        } else {
            tracing::warn!("No DATABASE_URL or JOURNAL_PATH; alerts and faces are kept in memory");
            (Arc::new(MemoryFaceStore::new()), Arc::new(MemoryAlertJournal::new()))
        };

    Ok(ProctoringOrchestrator::new(detection, providers, faces, journal)?)
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/test-connection", get(handlers::health::test_connection))

        // Alerts
        .route("/log-alert", post(handlers::alerts::log_alert))
        .route("/alerts", get(handlers::alerts::list))

        // Detection
        .route("/detect-head", post(handlers::detection::detect_head))
        .route("/detect-object", post(handlers::detection::detect_object))
        .route("/detect-audio-anomaly", post(handlers::detection::detect_audio_anomaly))

        // Faces
        .route("/register-face", post(handlers::faces::register))
        .route("/verify-face", post(handlers::faces::verify))
        .route("/registered-faces", get(handlers::faces::list_registered))

        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
