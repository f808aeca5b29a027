//! ExpertScope API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Clearance-aware discovery endpoints (search, experts, ask)
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::Request,
    middleware::{from_fn, Next},
    routing::get,
    Router,
};
use expertscope_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    embeddings::QueryEmbedder,
    errors::{AppError, Result},
    llm::{LlmClient, LlmError},
    metrics::{self, BACKEND_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
};
use expertscope_discovery::{
    ask::AskService,
    audit::AuditRecorder,
    experts::ExpertsService,
    graph::GraphExpander,
    livefetch::{
        openalex::{OpenAlexSource, WorkSource},
        LiveFetcher,
    },
    retrieval::ChunkRetriever,
    search::SearchService,
    synthesis::AnswerSynthesizer,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub search: Arc<SearchService>,
    pub experts: Arc<ExpertsService>,
    pub ask: Arc<AskService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration comes first so logging can honor its format settings
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting ExpertScope API Gateway v{}",
        expertscope_common::VERSION
    );

    // Initialize metrics; the exporter must be installed before the
    // metric descriptions are registered
    install_metrics_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // Wire the discovery pipelines
    let state = build_state(config.clone(), db)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Expose Prometheus metrics on a dedicated listener; port 0 disables the exporter
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_pipeline_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", METRICS_PREFIX)),
            BACKEND_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_answer_duration_seconds", METRICS_PREFIX)),
            BACKEND_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_live_fetch_duration_seconds", METRICS_PREFIX)),
            BACKEND_BUCKETS,
        )?
        .install()?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Construct the shared application state over one repository
fn build_state(config: Arc<AppConfig>, db: DbPool) -> Result<AppState> {
    let repository = Arc::new(Repository::new(db.clone()));
    let embedder = Arc::new(QueryEmbedder::from_config(&config.embedding)?);

    // Read-through backfill; stays dormant without a contact address
    let works: Option<Arc<dyn WorkSource>> = OpenAlexSource::from_config(&config.live_fetch)?
        .map(|source| Arc::new(source) as Arc<dyn WorkSource>);
    let live_fetcher = LiveFetcher::new(
        repository.clone(),
        works,
        embedder.primary(),
        &config.live_fetch,
    )?;

    // Answer LLM is optional; without a key the ask pipeline stays extractive
    let llm = match LlmClient::from_config(&config.llm) {
        Ok(client) => Some(client),
        Err(LlmError::MissingApiKey) => {
            info!("No answer LLM key configured, ask will use the extractive fallback");
            None
        }
        Err(error) => {
            return Err(AppError::Configuration {
                message: format!("answer LLM misconfigured: {}", error),
            })
        }
    };

    let search = {
        let retriever = ChunkRetriever::new(
            repository.clone(),
            config.search.scan_batch_size,
            config.search.max_chunk_scan,
        )?;
        let expander = GraphExpander::new(repository.clone(), config.graph.enable_two_hop);
        SearchService::new(
            repository.clone(),
            embedder.clone(),
            retriever,
            expander,
            live_fetcher,
            AuditRecorder::new(repository.clone()),
            &config.search,
            &config.graph,
        )?
    };

    let experts = {
        let retriever = ChunkRetriever::new(
            repository.clone(),
            config.search.scan_batch_size,
            config.experts.max_chunk_scan,
        )?;
        Arc::new(ExpertsService::new(
            repository.clone(),
            embedder.clone(),
            retriever,
            AuditRecorder::new(repository.clone()),
            &config.experts,
        )?)
    };

    let ask = {
        let retriever = ChunkRetriever::new(
            repository.clone(),
            config.search.scan_batch_size,
            config.ask.max_chunk_scan,
        )?;
        let synthesizer = AnswerSynthesizer::new(llm, config.ask.fallback_sentence_count)?;
        Arc::new(AskService::new(
            embedder,
            retriever,
            synthesizer,
            experts.clone(),
            AuditRecorder::new(repository.clone()),
            &config.ask,
        )?)
    };

    Ok(AppState {
        config,
        db,
        search: Arc::new(search),
        experts,
        ask,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Discovery endpoints share one rate-limit pool; probes stay exempt
    let mut api_routes = Router::new()
        .route("/api/search", get(handlers::search::search))
        .route("/api/experts", get(handlers::experts::experts))
        .route("/api/ask", get(handlers::ask::ask));

    if state.config.rate_limit.enabled {
        let limit = state.config.rate_limit.requests_per_second;
        let limiter =
            middleware::rate_limit::create_rate_limiter(limit, state.config.rate_limit.burst);
        api_routes = api_routes.layer(from_fn(move |request: Request, next: Next| {
            middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone(), limit)
        }));
    }

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        .merge(api_routes)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // set-id wraps propagate so generated ids reach the response echo
        .layer(propagate_id)
        .layer(request_id)
        .layer(from_fn(middleware::metrics::track_requests))
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
