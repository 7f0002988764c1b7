mod settings;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use extract::{LanguageModel, OllamaClient};
use index::{GraphStats, GraphStore, MemoryStore, Neo4jStore};
use pipeline::{
    CommunityBuildReport, ExtractReport, GraphRag, MetricsSnapshot, PipelineError, Record,
    SummaryReport,
};
use settings::{Settings, StoreBackend};

#[derive(Clone)]
struct AppState {
    rag: Arc<GraphRag>,
}

#[derive(Serialize)]
struct HealthResponse {
    store: String,
    model: String,
}

#[derive(Deserialize)]
struct ExtractRequest {
    /// Texts to extract from; short texts become one chunk each
    #[serde(default)]
    texts: Vec<String>,
    /// File or directory of .txt / .md documents to chunk and extract
    path: Option<String>,
    allowed_types: Vec<String>,
}

#[derive(Deserialize)]
struct QueryRequest {
    statement: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Fatal(message) => ApiError(StatusCode::BAD_REQUEST, message),
            PipelineError::Store(e) => ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    init_tracing(settings.json_logs);

    let store: Arc<dyn GraphStore> = match &settings.store {
        StoreBackend::Neo4j { uri, user, password } => Arc::new(Neo4jStore::connect(uri, user, password).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory graph store; nothing will be persisted");
            Arc::new(MemoryStore::new())
        }
    };
    let model: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(
        settings.pipeline.model.base_url.clone(),
        settings.pipeline.model.name.clone(),
    ));

    let rag = GraphRag::new(store, model, settings.pipeline.clone())
        .await
        .context("Failed to initialize the pipeline")?;
    let state = AppState { rag: Arc::new(rag) };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/extract", post(extract_texts))
        .route("/summarize", post(summarize_descriptions))
        .route("/communities", post(summarize_communities))
        .route("/query", post(run_query))
        .route("/stats", get(get_stats))
        .route("/metrics", get(get_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;

    tracing::info!(addr = %settings.bind_addr, "Server listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.rag.stats().await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Json(HealthResponse {
        store,
        model: state.rag.config().model.name.clone(),
    })
}

async fn extract_texts(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> ApiResult<ExtractReport> {
    let Some(path) = req.path else {
        return Ok(Json(state.rag.extract(&req.texts, &req.allowed_types).await?));
    };

    let path = PathBuf::from(path);
    let chunker = state.rag.config().chunker_config();
    let chunks = if path.is_file() {
        ingest::ingest_file(&path, chunker).await
    } else if path.is_dir() {
        ingest::ingest_directory(&path, chunker).await
    } else {
        return Err(ApiError(StatusCode::NOT_FOUND, format!("{} does not exist", path.display())));
    }
    .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("{:#}", e)))?;

    let mut chunks = chunks;
    chunks.extend(ingest::chunk_texts(&req.texts, chunker));

    Ok(Json(state.rag.extract_chunks(chunks, &req.allowed_types).await?))
}

async fn summarize_descriptions(State(state): State<AppState>) -> ApiResult<SummaryReport> {
    Ok(Json(state.rag.summarize_entities_and_relationships().await?))
}

async fn summarize_communities(State(state): State<AppState>) -> ApiResult<CommunityBuildReport> {
    Ok(Json(state.rag.summarize_communities().await?))
}

async fn run_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Vec<Record>> {
    Ok(Json(state.rag.query(&req.statement).await?))
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<GraphStats> {
    Ok(Json(state.rag.stats().await?))
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.rag.metrics().snapshot())
}
