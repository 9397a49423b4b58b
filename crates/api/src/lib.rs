//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for the media pipeline
//! - Bearer-token authentication middleware
//! - Response types

pub mod middleware;
pub mod routes;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use penned_core::storage::StorageService;
use penned_core::transform::TransformEngine;
use penned_shared::JwtService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
    /// Blob store client for image objects.
    pub storage: Arc<StorageService>,
    /// Image transform engine.
    pub transform: Arc<TransformEngine>,
    /// Maximum accepted multipart body size in bytes.
    pub max_upload_size: usize,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(DefaultBodyLimit::max(state.max_upload_size))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
