use std::sync::Arc;
use std::time::Duration;

use asset_orchestrator::config::AppConfig;
use asset_orchestrator::jobs::{InMemoryJobStore, JobStore, PgJobStore};
use asset_orchestrator::tools::ToolDispatcher;
use asset_orchestrator::webhook::CodeChangeLog;
use asset_orchestrator::{build_router, db, AppState, FallbackOrchestrator, ProviderRegistry};

/// Finished in-memory jobs are kept this long for status queries
const FINISHED_JOB_RETENTION_HOURS: i64 = 24;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env();
    config.log_summary();

    if let Err(e) = tokio::fs::create_dir_all(&config.output_dir).await {
        tracing::warn!("Failed to create output directory {}: {}", config.output_dir.display(), e);
    } else {
        tracing::info!("Output directory ready: {}", config.output_dir.display());
    }

    // One connection pool for every outbound call
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    let registry = Arc::new(ProviderRegistry::with_defaults(http.clone(), &config));
    let orchestrator = Arc::new(FallbackOrchestrator::new(
        registry,
        config.provider_max_concurrency,
    ));

    let (job_store, storage_backend) = init_job_store(&config).await;

    let tools = Arc::new(ToolDispatcher::with_defaults(http, &config));

    if config.webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET not set. Every webhook delivery will be rejected.");
    }

    let shared_state = Arc::new(AppState {
        orchestrator,
        job_store,
        storage_backend,
        tools,
        code_changes: Arc::new(CodeChangeLog::new()),
        webhook_secret: config.webhook_secret.clone(),
    });

    let app = build_router(shared_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Postgres when DATABASE_URL is set and reachable, otherwise a process-local store
async fn init_job_store(config: &AppConfig) -> (Arc<dyn JobStore>, &'static str) {
    if let Some(database_url) = &config.database_url {
        match db::create_pool(database_url).await {
            Ok(pool) => {
                tracing::info!("🗄️ Job store: PostgreSQL");
                return (Arc::new(PgJobStore::new(pool)), "postgres");
            }
            Err(e) => {
                tracing::error!("Failed to connect to database, falling back to in-memory jobs: {}", e);
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set. Jobs are kept in memory and lost on restart.");
    }

    let store = InMemoryJobStore::new();
    let cleanup = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = cleanup
                .cleanup_finished(chrono::Duration::hours(FINISHED_JOB_RETENTION_HOURS))
                .await;
            if removed > 0 {
                tracing::info!("🗑️ Removed {} finished jobs", removed);
            }
        }
    });

    (Arc::new(store), "in-memory")
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,asset_orchestrator=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,asset_orchestrator=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("🎛️ Asset orchestrator starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
