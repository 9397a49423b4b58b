//! Storage service implementation using Apache OpenDAL.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use opendal::{ErrorKind, Operator, services};
use uuid::Uuid;

use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;

/// Presigned URL for temporary read access.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use (GET).
    pub method: String,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
    /// Required headers for the request.
    pub headers: HashMap<String, String>,
}

/// Generated object keys for one uploaded image.
///
/// The original and its thumbnail share a random stem so the pair is
/// correlated in the store; collisions are as unlikely as UUID collisions
/// regardless of the client-supplied filename.
#[derive(Debug, Clone)]
pub struct ObjectKeys {
    /// Server-generated storage name: `{uuid}{ext}`.
    pub filename: String,
    /// Key of the original object: `{image_prefix}/{uuid}{ext}`.
    pub key: String,
    /// Key of the derived thumbnail: `{thumbnail_prefix}/{uuid}_thumb{ext}`.
    pub thumbnail_key: String,
}

impl ObjectKeys {
    /// Generate a fresh key pair for an upload.
    #[must_use]
    pub fn generate(image_prefix: &str, thumbnail_prefix: &str, original_filename: &str) -> Self {
        let stem = Uuid::new_v4();
        let ext = file_extension(original_filename);
        let filename = format!("{stem}{ext}");

        Self {
            key: format!("{image_prefix}/{filename}"),
            thumbnail_key: format!("{thumbnail_prefix}/{stem}_thumb{ext}"),
            filename,
        }
    }
}

/// Blob store operations consumed by the media pipeline.
///
/// This trait is the seam between the pipeline and the object store; the db
/// crate has an equivalent seam for metadata (`media::ImageRepository`).
/// Implementations must be safe for concurrent invocation by many in-flight
/// pipelines.
pub trait BlobStore: Send + Sync {
    /// Generate the key pair for a new upload.
    fn object_keys(&self, original_filename: &str) -> ObjectKeys;

    /// Plain (non-presigned) URL for an object.
    fn url_for(&self, key: &str) -> String;

    /// Maximum accepted object size in bytes.
    fn max_object_size(&self) -> u64;

    /// Durably store an object.
    fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Delete an object. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Generate a time-limited read URL for an object.
    fn presign_read(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<PresignedUrl, StorageError>> + Send;
}

/// Storage service for image objects.
pub struct StorageService {
    operator: Operator,
    config: StorageConfig,
}

impl StorageService {
    /// Create a new storage service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: StorageConfig) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self { operator, config })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
            StorageProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );

                Ok(Operator::new(builder)
                    .map_err(|e| StorageError::configuration(e.to_string()))?
                    .finish())
            }
        }
    }

    /// Check an object size against the configured limit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileTooLarge` when over the limit.
    pub fn validate_size(&self, size: u64) -> Result<(), StorageError> {
        if size > self.config.max_file_size {
            return Err(StorageError::file_too_large(
                size,
                self.config.max_file_size,
            ));
        }
        Ok(())
    }

    /// Check if an object exists in storage.
    pub async fn exists(&self, key: &str) -> bool {
        match self.operator.stat(key).await {
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(_) => false,
        }
    }

    /// Get the storage provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Get the bucket/container name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.config.provider.bucket()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl BlobStore for StorageService {
    fn object_keys(&self, original_filename: &str) -> ObjectKeys {
        ObjectKeys::generate(
            &self.config.image_prefix,
            &self.config.thumbnail_prefix,
            original_filename,
        )
    }

    fn url_for(&self, key: &str) -> String {
        if let Some(base) = &self.config.public_base_url {
            return format!("{}/{key}", base.trim_end_matches('/'));
        }

        match &self.config.provider {
            StorageProvider::S3 {
                endpoint, bucket, ..
            } => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
            StorageProvider::LocalFs { root } => {
                format!("file://{}/{key}", root.display())
            }
        }
    }

    fn max_object_size(&self) -> u64 {
        self.config.max_file_size
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.operator
            .write_with(key, bytes)
            .content_type(content_type)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.operator.delete(key).await.map_err(StorageError::from)
    }

    async fn presign_read(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        let presigned = self
            .operator
            .presign_read(key, ttl)
            .await
            .map_err(StorageError::from)?;

        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            method: presigned.method().to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs),
            headers: HashMap::new(),
        })
    }
}

/// Sanitize a client-supplied filename for storage and persistence.
///
/// Path components are stripped first, then anything outside ASCII
/// alphanumerics, dots, hyphens, and underscores is replaced.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extension of a sanitized filename, dot included; empty when absent.
fn file_extension(original_filename: &str) -> String {
    let sanitized = sanitize_filename(original_filename);
    sanitized
        .rfind('.')
        .filter(|&idx| idx > 0)
        .map(|idx| sanitized[idx..].to_ascii_lowercase())
        .unwrap_or_default()
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    // Property: sanitized filenames only contain safe characters.
    proptest! {
        #[test]
        fn prop_sanitized_filename_safe_chars(filename in ".*") {
            let sanitized = sanitize_filename(&filename);

            for c in sanitized.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';
                prop_assert!(is_safe, "Unexpected character in sanitized filename: {}", c);
            }
        }
    }

    // Property: generated keys always live under their configured prefixes
    // and the thumbnail key carries the `_thumb` marker.
    proptest! {
        #[test]
        fn prop_object_key_format(
            filename in "[a-zA-Z0-9_-]{1,50}\\.[a-z]{2,4}",
        ) {
            let keys = ObjectKeys::generate("originals", "thumbs", &filename);

            let parts: Vec<&str> = keys.key.split('/').collect();
            prop_assert_eq!(parts.len(), 2);
            prop_assert_eq!(parts[0], "originals");
            prop_assert_eq!(parts[1], keys.filename.as_str());

            let thumb_parts: Vec<&str> = keys.thumbnail_key.split('/').collect();
            prop_assert_eq!(thumb_parts.len(), 2);
            prop_assert_eq!(thumb_parts[0], "thumbs");
            prop_assert!(thumb_parts[1].contains("_thumb"));
        }
    }

    // Property: the key never leaks the client-supplied name; the stem is a
    // fresh UUID.
    proptest! {
        #[test]
        fn prop_object_key_stem_is_uuid(filename in "[a-zA-Z0-9]{1,20}\\.[a-z]{2,4}") {
            let keys = ObjectKeys::generate("p", "t", &filename);
            let stem = keys
                .filename
                .rfind('.')
                .map_or(keys.filename.as_str(), |idx| &keys.filename[..idx]);
            prop_assert!(Uuid::parse_str(stem).is_ok());
        }
    }
}
