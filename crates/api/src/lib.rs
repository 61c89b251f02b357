//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for the attachment upload lifecycle
//! - Idempotent bulk incident commands
//! - Authentication middleware
//! - Error rendering

pub mod error;
pub mod middleware;
pub mod routes;


use std::sync::Arc;

use axum::Router;
use chrono::Duration;
use incident_core::attachment::AttachmentPolicy;
use incident_core::sanitize::ImageSanitizer;
use incident_core::signing::SignedUrlService;
use incident_core::storage::{BlobStorage, LoopbackStore};
use incident_shared::JwtService;
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
    /// Blob storage backend selected at startup.
    pub storage: Arc<dyn BlobStorage>,
    /// In-process object store, present only with the loopback backend.
    pub loopback: Option<LoopbackStore>,
    /// Image sanitizer used after completion.
    pub sanitizer: Option<Arc<dyn ImageSanitizer>>,
    /// Attachment policy.
    pub policy: Arc<AttachmentPolicy>,
    /// Signer for anonymous download links.
    pub signer: SignedUrlService,
    /// Lifetime of a download link.
    pub download_link_ttl: Duration,
    /// How long bulk command responses are replayed.
    pub idempotency_ttl: Duration,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
