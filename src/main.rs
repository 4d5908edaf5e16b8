//! taskhook webhook service.
//!
//! Main entry point. Wires the tenant stores, verifier, durable dispatcher
//! and automation processor together, then serves HTTP until SIGINT/SIGTERM.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use taskhook_api::{
    start_server, AppState, Config, IngressBuffer, IngressConsumer, IngressPipeline,
};
use taskhook_automation::{AutomationProcessor, HttpTaskDetailClient, LoggingHandler};
use taskhook_core::{
    secrets::{EnvSecretStore, FileSecretStore},
    storage::{self, Storage},
    SecretStore, TenantResolver, WebhookVerifier,
};
use taskhook_dispatch::{CloudTasksQueue, DurableDispatcher};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Initialize tracing with structured logging
    init_tracing(&config)?;

    info!("Starting taskhook webhook service");
    info!(
        database_url = %config.database_url_masked(),
        provider = %config.provider,
        ingress_capacity = config.ingress_queue_capacity,
        ingress_workers = config.ingress_workers,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    storage::migrate(&db_pool).await.context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let storage = Storage::new(db_pool.clone());

    let secrets: Arc<dyn SecretStore> = match &config.secrets_dir {
        Some(dir) => {
            info!(secrets_dir = %dir, "Reading secrets from files");
            Arc::new(FileSecretStore::new(dir))
        },
        None => {
            info!("Reading secrets from environment variables");
            Arc::new(EnvSecretStore::default())
        },
    };

    let resolver =
        TenantResolver::new(storage.tenant_metadata.clone(), secrets, &config.metadata_namespace);
    let verifier = WebhookVerifier::new(resolver, config.to_verifier_config());

    let dispatcher_config = config.to_dispatcher_config();
    if dispatcher_config.callback_url.is_empty() {
        warn!("No callback URL configured; set TASKS_CALLBACK_URL or SERVICE_URL");
    }
    if dispatcher_config.queue.project.is_empty() {
        warn!("No durable queue project configured; set TASKS_PROJECT");
    }
    let task_queue = CloudTasksQueue::new(config.to_cloud_tasks_config())
        .context("Failed to build task queue client")?;
    let dispatcher = DurableDispatcher::new(Arc::new(task_queue), dispatcher_config);

    let task_api =
        HttpTaskDetailClient::new(&config.upstream_api_base_url, config.upstream_timeout())
            .context("Failed to build upstream Task API client")?;
    let processor = AutomationProcessor::new(
        LoggingHandler::registry(),
        Arc::new(task_api),
        storage.initiations.clone(),
    );

    let shutdown = CancellationToken::new();
    let (buffer, queue) = IngressBuffer::new(config.ingress_queue_capacity);
    let pipeline = Arc::new(IngressPipeline::new(verifier, dispatcher));
    let consumer =
        IngressConsumer::new(queue, pipeline, &config.to_ingress_config()).spawn(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            taskhook_api::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let state = AppState::new(buffer, processor, &config.provider)
        .with_request_timeout(config.request_timeout())
        .with_max_body_bytes(config.ingress_max_body_bytes);
    let addr = config.parse_server_addr()?;

    info!(
        %addr,
        ingress = %config.ingress_path(),
        callback = %config.callback_path(),
        "taskhook is ready to receive webhooks"
    );

    let served = start_server(state, addr, shutdown.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "Server failed");
        shutdown.cancel();
    }

    if let Err(e) = consumer.await {
        error!(error = %e, "Ingress consumer terminated abnormally");
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("taskhook shutdown complete");
    served.context("HTTP server error")
}

/// Initializes tracing from the configured filter and log format.
fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(&config.rust_log).context("Invalid RUST_LOG directives")?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_logs() {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true).with_line_number(true)).try_init()
    };

    installed.context("Failed to install tracing subscriber")
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
