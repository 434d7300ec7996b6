use axum::{extract::FromRef, middleware, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tsumugi::domain::{default_pricing_table, CostEstimator};

mod adapters;
mod application;
mod auth;
mod config;
mod models;
mod routes;

use adapters::{
    OpenAiChatProvider, OpenAiEmbeddingService, PgApiKeyRepository, PgConversationStore,
    PgDocumentRepository, PgUsageRepository,
};
use application::{
    ChatOrchestrator, DocumentChat, DocumentService, FileSearchTool, ToolRegistry, UsageRecorder,
    VectorRetriever,
};
use config::ServerConfig;

/// Type aliases for application services with concrete adapters
pub type AppChatOrchestrator = ChatOrchestrator<PgConversationStore, OpenAiChatProvider>;
pub type AppRetriever = VectorRetriever<PgDocumentRepository, OpenAiEmbeddingService>;
pub type AppDocumentChat =
    DocumentChat<PgDocumentRepository, OpenAiEmbeddingService, OpenAiChatProvider>;
pub type AppDocumentService = DocumentService<PgDocumentRepository, OpenAiEmbeddingService>;
pub type AppUsageRecorder = UsageRecorder<PgUsageRepository>;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub chat: Arc<AppChatOrchestrator>,
    pub retriever: Arc<AppRetriever>,
    pub documents: Arc<AppDocumentService>,
    pub document_chat: Arc<AppDocumentChat>,
    pub usage: Arc<AppUsageRecorder>,
    pub api_keys: Arc<PgApiKeyRepository>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

#[derive(Serialize)]
struct HealthCheck {
    status: String,
    message: String,
    version: String,
}

async fn health_check() -> Json<HealthCheck> {
    Json(HealthCheck {
        status: "ok".to_string(),
        message: "Tsumugi API is running - threads are being spun".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn build_state(pool: PgPool, config: &ServerConfig) -> anyhow::Result<AppState> {
    let mut chat_model =
        OpenAiChatProvider::new(config.openai_api_key.clone(), config.openai_model.clone())
            .with_temperature(config.openai_temperature);
    let mut embedding = OpenAiEmbeddingService::new(config.openai_api_key.clone())
        .with_model(config.embedding_model.clone());
    if let Some(base_url) = &config.openai_base_url {
        chat_model = chat_model.with_base_url(base_url.clone());
        embedding = embedding.with_base_url(base_url.clone());
    }
    let chat_model = Arc::new(chat_model);
    let embedding = Arc::new(embedding);

    let documents_repo = Arc::new(PgDocumentRepository::new(pool.clone()));
    let retriever = Arc::new(VectorRetriever::new(
        documents_repo.clone(),
        embedding.clone(),
    ));

    let file_search = Arc::new(
        FileSearchTool::new(retriever.clone()).with_default_top_k(config.file_search_default_top_k),
    );
    let mut tools = ToolRegistry::new();
    tools.register(file_search.clone())?;
    tracing::info!("🔧 Server tools registered: fileSearch");

    let document_chat = Arc::new(
        DocumentChat::new(chat_model.clone(), file_search)
            .with_model_call_timeout(config.orchestrator.model_call_timeout),
    );
    let chat = Arc::new(ChatOrchestrator::new(
        Arc::new(PgConversationStore::new(pool.clone())),
        chat_model,
        tools,
        config.orchestrator,
    ));

    let mut estimator =
        CostEstimator::new(default_pricing_table()).with_currency(config.price_currency.clone());
    estimator.set_multiplier(config.price_multiplier);
    let usage = Arc::new(UsageRecorder::new(
        Arc::new(PgUsageRepository::new(pool.clone())),
        estimator,
    ));

    Ok(AppState {
        pool: pool.clone(),
        chat,
        retriever,
        documents: Arc::new(DocumentService::new(documents_repo, embedding)),
        document_chat,
        usage,
        api_keys: Arc::new(PgApiKeyRepository::new(pool)),
    })
}

#[shuttle_runtime::main]
async fn main(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secrets: shuttle_runtime::SecretStore,
) -> shuttle_axum::ShuttleAxum {
    tracing::info!("🧵 Tsumugi API initializing...");

    let config = ServerConfig::from_secrets(&secrets)?;
    tracing::info!(
        "🤖 Chat model {} (max {} round-trips, {} history tokens)",
        config.openai_model,
        config.orchestrator.max_iterations,
        config.orchestrator.max_history_tokens
    );

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run database migrations: {e}"))?;

    tracing::info!("✅ Database migrations completed");

    let state = build_state(pool, &config)?;

    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .merge(routes::chat::router())
        .merge(routes::file::router())
        .merge(routes::usage::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // OpenAPI documentation
    let openapi = routes::swagger::ApiDoc::openapi();

    // Build router with shared state
    let router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .route("/health", get(health_check))
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    tracing::info!("📚 Swagger UI: /swagger-ui");
    tracing::info!("✅ Tsumugi API ready");

    Ok(router.into())
}
