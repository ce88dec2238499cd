//! Document intake service
//!
//! A messaging bot that walks applicants through a category-specific
//! document checklist, stores each upload, and forwards the packaged
//! application to the back office.

mod api;
mod catalog;
mod config;
mod db;
mod forwarder;
mod gateway;
mod runtime;
mod scheduler;
mod session;
mod state_machine;
mod storage;

use api::{create_router, AppState};
use catalog::Catalog;
use chrono::Utc;
use config::AppConfig;
use db::Database;
use forwarder::WebhookForwarder;
use gateway::{HttpGateway, LoggingGateway};
use runtime::{
    Collaborators, DatabaseStorage, OutboundGateway, RateLimiter, RuntimeDeps, RuntimeManager,
};
use scheduler::Scheduler;
use session::SessionStore;
use state_machine::IntakeContext;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::FsDocumentStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long pending archive cleanups get to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_intake=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Snapshots older than the idle timeout are not restored, only deleted
    let session_timeout = chrono::Duration::from_std(config.session_timeout)?;
    let cutoff = Utc::now() - session_timeout;
    let sessions = db.load_sessions(cutoff)?;
    let purged = db.delete_sessions_before(cutoff)?;
    if purged > 0 {
        tracing::info!(count = purged, "Deleted session snapshots that expired while stopped");
    }

    let context = Arc::new(IntakeContext::new(
        Arc::new(Catalog::standard()),
        config.empty_submission,
    ));

    let gateway: Arc<dyn OutboundGateway> = if let Some(gateway_config) = config.gateway() {
        tracing::info!(base_url = %gateway_config.base_url, "Messaging gateway configured");
        Arc::new(HttpGateway::new(gateway_config)?)
    } else {
        tracing::warn!("No messaging gateway configured. Set INTAKE_GATEWAY_URL to deliver replies.");
        Arc::new(LoggingGateway)
    };

    let forwarder = WebhookForwarder::new(config.forwarder())?;
    tracing::info!(channel = %forwarder.channel(), "Submission forwarder ready");

    let collaborators = Collaborators {
        gateway,
        documents: Arc::new(FsDocumentStore::new(config.data_dir.clone())),
        forwarder: Arc::new(forwarder),
        persistence: Arc::new(DatabaseStorage::new(db.clone())),
    };

    let scheduler = Scheduler::new();
    let deps = RuntimeDeps {
        store: Arc::new(SessionStore::new()),
        context,
        collaborators,
        scheduler: scheduler.clone(),
        archive_grace: config.archive_grace,
    };
    let runtime = Arc::new(RuntimeManager::new(
        deps,
        RateLimiter::new(config.rate_limit_per_minute),
        session_timeout,
    ));

    let restored = runtime.restore(sessions).await;
    tracing::info!(count = restored, "Restored sessions");

    {
        let runtime = runtime.clone();
        scheduler.every("session-sweep", config.sweep_interval, move || {
            let runtime = runtime.clone();
            async move {
                runtime.sweep_expired(Utc::now()).await;
            }
        });
    }

    let state = AppState::new(runtime, db);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Document intake server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(pending = scheduler.pending(), "Flushing scheduled tasks");
    scheduler.shutdown(SHUTDOWN_GRACE).await;

    Ok(())
}

/// Returns on SIGINT or SIGTERM
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for SIGINT");
            }
            tracing::info!("Received SIGINT - shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM - shutting down");
        }
    }
}
