//! services/api/src/bin/api.rs

use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, Method,
};
use axum::Router;
use quiz_api_lib::{
    adapters::{InMemoryDb, InMemoryPrefetchCache, OpenAiQuestionAdapter, PgAdapter, TokenOverlapSimilarity},
    config::Config,
    error::ApiError,
    supply::{OrphanReclaimer, QuizService},
    web::{api_router, rest::ApiDoc, AppState},
};
use quiz_supply_core::{
    dedup::Deduplicator,
    difficulty::DifficultyEngine,
    ports::{DatabaseService, SimilarityService},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Store & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = PgAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set, using the in-memory store. Data will not survive a restart.");
            Arc::new(InMemoryDb::new())
        }
    };

    // --- 3. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    if let Some(base_url) = &config.openai_base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    let openai_client = Client::with_config(openai_config);
    let generator = Arc::new(OpenAiQuestionAdapter::new(
        openai_client,
        config.generator_model.clone(),
    ));
    let similarity: Arc<dyn SimilarityService> = Arc::new(TokenOverlapSimilarity::new());
    let cache = Arc::new(InMemoryPrefetchCache::new());

    // --- 4. Build the Pipeline & Background Tasks ---
    let shutdown = CancellationToken::new();
    let quiz = Arc::new(QuizService::new(
        db.clone(),
        generator,
        Some(similarity),
        cache,
        DifficultyEngine::default(),
        Deduplicator::default(),
        config.pipeline.clone(),
        shutdown.clone(),
    ));
    let sweeper = OrphanReclaimer::new(db).spawn_sweeper(config.pipeline.orphan_sweep_interval, shutdown.clone());

    let app_state = Arc::new(AppState {
        quiz: quiz.clone(),
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    let app = Router::new()
        .merge(api_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for the shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    // --- 7. Stop Background Work ---
    quiz.shutdown();
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Orphan sweeper ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}
