//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtSettings,
    /// Object storage configuration.
    pub storage: StorageSettings,
    /// Media pipeline configuration.
    #[serde(default)]
    pub media: MediaSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for verifying tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Object storage configuration.
///
/// `provider` selects the backend: `"s3"` (any S3-compatible service) or
/// `"local"` (filesystem, development only). The S3 fields are required for
/// the former, `root` for the latter.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Storage backend: "s3" or "local".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// S3 endpoint URL.
    #[serde(default)]
    pub endpoint: String,
    /// S3 bucket name.
    #[serde(default)]
    pub bucket: String,
    /// S3 access key ID.
    #[serde(default)]
    pub access_key_id: String,
    /// S3 secret access key.
    #[serde(default)]
    pub secret_access_key: String,
    /// S3 region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Root directory for the local provider.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Base URL for plain object links; defaults per provider when empty.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_storage_root() -> String {
    "./storage".to_string()
}

/// Media pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Target thumbnail width in pixels.
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    /// Maximum upload size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Key prefix for original images.
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    /// Key prefix for derived thumbnails.
    #[serde(default = "default_thumbnail_prefix")]
    pub thumbnail_prefix: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            thumbnail_width: default_thumbnail_width(),
            max_file_size: default_max_file_size(),
            image_prefix: default_image_prefix(),
            thumbnail_prefix: default_thumbnail_prefix(),
        }
    }
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_image_prefix() -> String {
    "post-images".to_string()
}

fn default_thumbnail_prefix() -> String {
    "thumbnails".to_string()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("PENNED").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [server]

        [database]
        url = "postgres://localhost/penned"

        [jwt]
        secret = "test-secret"

        [storage]
    "#;

    fn parse(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("config should build")
            .try_deserialize()
            .expect("config should deserialize")
    }

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse(MINIMAL);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.jwt.access_token_expiry_secs, 900);
        assert_eq!(cfg.storage.provider, "local");
        assert_eq!(cfg.storage.root, "./storage");
        assert_eq!(cfg.media.thumbnail_width, 300);
        assert_eq!(cfg.media.max_file_size, 10 * 1024 * 1024);
        assert_eq!(cfg.media.image_prefix, "post-images");
        assert_eq!(cfg.media.thumbnail_prefix, "thumbnails");
    }

    #[test]
    fn test_media_overrides() {
        let toml = format!(
            "{MINIMAL}\n[media]\nthumbnail_width = 480\nimage_prefix = \"uploads\"\n"
        );
        let cfg = parse(&toml);
        assert_eq!(cfg.media.thumbnail_width, 480);
        assert_eq!(cfg.media.image_prefix, "uploads");
        // Untouched fields keep their defaults.
        assert_eq!(cfg.media.thumbnail_prefix, "thumbnails");
    }

    #[test]
    fn test_s3_provider_settings() {
        let toml = r#"
            [server]

            [database]
            url = "postgres://localhost/penned"

            [jwt]
            secret = "test-secret"

            [storage]
            provider = "s3"
            endpoint = "https://account.r2.cloudflarestorage.com"
            bucket = "penned-media"
            access_key_id = "key"
            secret_access_key = "secret"
        "#;
        let cfg = parse(toml);
        assert_eq!(cfg.storage.provider, "s3");
        assert_eq!(cfg.storage.bucket, "penned-media");
        assert_eq!(cfg.storage.region, "auto");
        assert!(cfg.storage.public_base_url.is_none());
    }
}
