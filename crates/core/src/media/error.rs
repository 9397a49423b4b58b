//! Media pipeline error taxonomy.

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;
use crate::transform::TransformError;

/// Media pipeline errors.
///
/// The upload stages map onto this taxonomy: validation failures are
/// `InvalidFormat`, blob-store write failures are `UploadFailed`, transform
/// failures are `ProcessingFailed`. None of them is retried automatically.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Unsupported or undecodable upload; rejected before any store write.
    #[error("invalid image format: {0}")]
    InvalidFormat(String),

    /// Upload exceeds the configured size limit.
    #[error("file too large: {size} bytes exceeds maximum {max} bytes")]
    FileTooLarge {
        /// Actual upload size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// A blob-store write failed (original or thumbnail stage).
    #[error("image upload failed: {0}")]
    UploadFailed(StorageError),

    /// Thumbnail derivation failed; the stored original is retained.
    #[error("image processing failed: {0}")]
    ProcessingFailed(TransformError),

    /// Image not found.
    #[error("image not found: {0}")]
    NotFound(Uuid),

    /// Post not found.
    #[error("post not found: {0}")]
    PostNotFound(Uuid),

    /// Principal does not own the post.
    #[error("not allowed to modify post {0}")]
    PermissionDenied(Uuid),

    /// Presign expiration must be positive.
    #[error("expiration minutes must be positive")]
    InvalidExpiration,

    /// Display order must be non-negative.
    #[error("display order must be non-negative, got {0}")]
    InvalidDisplayOrder(i32),

    /// Storage operation failed outside the upload stages (delete/presign).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// An upload task died before reporting an outcome.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound(id)
    }

    /// Create a post not found error.
    #[must_use]
    pub fn post_not_found(id: Uuid) -> Self {
        Self::PostNotFound(id)
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
