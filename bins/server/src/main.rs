//! Incident reporting API server.
//!
//! Main entry point for the incident reporting backend service.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use incident_api::{AppState, create_router};
use incident_core::attachment::AttachmentPolicy;
use incident_core::idempotency::IdempotencyStore;
use incident_core::sanitize::{ImageSanitizer, MetadataStrippingSanitizer};
use incident_core::signing::SignedUrlService;
use incident_core::storage::{StorageBackend, StorageProvider};
use incident_db::{IdempotencyRepository, connect_pooled};
use incident_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = connect_pooled(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("Failed to connect to database")?;
    info!("Connected to database");

    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_minutes: i64::try_from(config.jwt.access_token_expiry_secs / 60)
            .unwrap_or(i64::MAX),
    });

    // Storage backend is chosen once, at startup
    let provider = StorageProvider::try_from(&config.storage)?;
    let backend = StorageBackend::from_provider(&provider)?;
    let loopback = backend.loopback().cloned();
    let storage = backend.into_shared();
    info!(
        provider = storage.provider_name(),
        loopback = loopback.is_some(),
        "Blob storage configured"
    );

    let policy = Arc::new(AttachmentPolicy::from(&config.attachments));
    let sanitizer: Option<Arc<dyn ImageSanitizer>> = if policy.sanitize_images() {
        Some(Arc::new(MetadataStrippingSanitizer::new(storage.clone())))
    } else {
        None
    };

    let signer = SignedUrlService::new(&config.signing.secret)
        .context("Invalid download link signing secret")?;

    let shutdown = CancellationToken::new();
    let pruner = spawn_idempotency_pruner(
        db.clone(),
        std::time::Duration::from_secs(config.idempotency.prune_interval_secs.max(1)),
        shutdown.clone(),
    );

    let state = AppState {
        db: Arc::new(db),
        jwt_service: Arc::new(jwt_service),
        storage,
        loopback,
        sanitizer,
        policy,
        signer,
        download_link_ttl: chrono::Duration::minutes(i64::from(
            config.signing.download_link_minutes_to_live,
        )),
        idempotency_ttl: chrono::Duration::hours(i64::from(config.idempotency.ttl_hours)),
        shutdown: shutdown.clone(),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    if let Err(e) = pruner.await {
        warn!(error = %e, "Idempotency pruner did not stop cleanly");
    }

    Ok(())
}

/// Periodically delete expired idempotency records until shutdown.
fn spawn_idempotency_pruner(
    db: DatabaseConnection,
    every: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let store = IdempotencyRepository::new(db);
        let mut ticker = tokio::time::interval(every);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => match store.prune_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Pruned expired idempotency records"),
                    Err(e) => warn!(error = %e, "Failed to prune idempotency records"),
                },
            }
        }
    })
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight work.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down gracefully...");
    shutdown.cancel();
}
