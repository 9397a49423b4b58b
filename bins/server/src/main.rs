//! Penned API Server
//!
//! Main entry point for the Penned media backend service.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use penned_api::{AppState, create_router};
use penned_core::storage::{StorageConfig, StorageProvider, StorageService};
use penned_core::transform::TransformEngine;
use penned_db::connect;
use penned_shared::{AppConfig, JwtConfig, JwtService};

/// Build the core storage configuration from the loaded settings.
fn build_storage_config(config: &AppConfig) -> anyhow::Result<StorageConfig> {
    let provider = match config.storage.provider.as_str() {
        "s3" => StorageProvider::s3(
            config.storage.endpoint.clone(),
            config.storage.bucket.clone(),
            config.storage.access_key_id.clone(),
            config.storage.secret_access_key.clone(),
            config.storage.region.clone(),
        ),
        "local" => StorageProvider::local_fs(config.storage.root.clone()),
        other => anyhow::bail!("unknown storage provider: {other}"),
    };

    let mut storage_config = StorageConfig::new(provider)
        .with_max_file_size(config.media.max_file_size)
        .with_image_prefix(config.media.image_prefix.clone())
        .with_thumbnail_prefix(config.media.thumbnail_prefix.clone());

    if let Some(base) = &config.storage.public_base_url {
        storage_config = storage_config.with_public_base_url(base.clone());
    }

    Ok(storage_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "penned=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Connect to database
    let db = connect(&config.database.url).await?;
    info!("Connected to database");

    // Create JWT service
    let jwt_config = JwtConfig {
        secret: config.jwt.secret.clone(),
        #[allow(clippy::cast_possible_wrap)]
        access_token_expires_minutes: (config.jwt.access_token_expiry_secs / 60) as i64,
    };
    let jwt_service = JwtService::new(jwt_config);

    // Create storage service
    let storage_config = build_storage_config(&config)?;
    let storage = StorageService::from_config(storage_config)
        .context("failed to initialize object storage")?;
    info!(
        provider = storage.provider_name(),
        bucket = storage.bucket(),
        "Object storage configured"
    );

    // Create transform engine
    let transform = TransformEngine::new(config.media.thumbnail_width);
    info!(
        thumbnail_width = transform.thumbnail_width(),
        "Transform engine configured"
    );

    // Create application state
    let state = AppState {
        db: Arc::new(db),
        jwt_service: Arc::new(jwt_service),
        storage: Arc::new(storage),
        transform: Arc::new(transform),
        max_upload_size: usize::try_from(config.media.max_file_size)
            .unwrap_or(usize::MAX),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
