mod artifacts;
mod config;
mod cv_architect;
mod db;
mod discovery;
mod errors;
mod form_filler;
mod knowledge;
mod llm_client;
mod models;
mod notifications;
mod routes;
mod state;
mod workflow;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::artifacts::{CvArchive, InMemoryCvArchive, S3CvArchive};
use crate::config::{Config, S3Settings};
use crate::cv_architect::LlmCvArchitect;
use crate::db::create_pool;
use crate::discovery::{default_sources, load_sources, BoardDiscovery};
use crate::form_filler::{BoardFormFiller, DryRunSubmitter, FieldResolver};
use crate::knowledge::{InMemoryKnowledgeBase, KnowledgeStore};
use crate::llm_client::LlmClient;
use crate::notifications::{FanoutSink, InAppNotifications, NotificationSink, RedisNotificationSink};
use crate::routes::build_router;
use crate::state::AppState;
use crate::workflow::orchestrator::{Collaborators, WorkflowOrchestrator};
use crate::workflow::service::WorkflowService;
use crate::workflow::store::{InMemoryWorkflowStore, PgWorkflowStore, WorkflowStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobPilot API v{}", env!("CARGO_PKG_VERSION"));
    let settings = config.workflow.clone();

    // Workflow store: PostgreSQL when configured
    let store: Arc<dyn WorkflowStore> = match &config.database_url {
        Some(url) => {
            let pg = PgWorkflowStore::new(create_pool(url).await?);
            pg.ensure_schema().await?;
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set, workflows are kept in memory");
            Arc::new(InMemoryWorkflowStore::new())
        }
    };

    // Notifications: in-app inbox, plus Redis pub/sub when configured
    let inbox = Arc::new(InAppNotifications::new());
    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![inbox.clone()];
    if let Some(url) = &config.redis_url {
        sinks.push(Arc::new(RedisNotificationSink::new(redis::Client::open(url.as_str())?)));
        info!("Redis notification fan-out enabled");
    }

    // CV archive: S3 / MinIO when configured
    let archive: Arc<dyn CvArchive> = match &config.s3 {
        Some(s3) => {
            info!("Archiving approved CVs to bucket {}", s3.bucket);
            Arc::new(S3CvArchive::new(build_s3_client(s3).await, s3.bucket.clone()))
        }
        None => Arc::new(InMemoryCvArchive::new()),
    };

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), settings.collaborator_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let sources = match &config.discovery_sources_path {
        Some(path) => load_sources(path)?,
        None => default_sources(),
    };
    info!("Discovery covers {} job boards", sources.len());

    let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeBase::new());
    let form_filler = BoardFormFiller::new(
        FieldResolver::new(knowledge.clone(), settings.confidence_threshold),
        Arc::new(DryRunSubmitter::new()),
        settings.collaborator_timeout,
    )?;

    let collaborators = Collaborators {
        discovery: Arc::new(BoardDiscovery::new(sources, settings.collaborator_timeout)?),
        cv_architect: Arc::new(LlmCvArchitect::new(llm, settings.cv_max_attempts)),
        form_filler: Arc::new(form_filler),
        knowledge: knowledge.clone(),
        notifications: Arc::new(FanoutSink::new(sinks)),
        archive,
    };
    let orchestrator = WorkflowOrchestrator::new(collaborators, settings);

    // Build app state
    let state = AppState {
        service: Arc::new(WorkflowService::new(store, orchestrator, knowledge.clone())),
        knowledge,
        inbox,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(s3: &S3Settings) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &s3.access_key_id,
        &s3.secret_access_key,
        None,
        None,
        "jobpilot-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&s3.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
