//! Media domain types and data structures.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::error::MediaError;

/// A post's image attachment, as persisted by the pipeline.
#[derive(Debug, Clone)]
pub struct PostImage {
    /// Unique identifier, assigned at persistence time.
    pub id: Uuid,
    /// Owning post reference.
    pub post_id: Uuid,
    /// Server-generated storage name.
    pub filename: String,
    /// Sanitized client-supplied name.
    pub original_filename: String,
    /// MIME type of the original.
    pub content_type: String,
    /// Original size in bytes.
    pub file_size: i64,
    /// Storage key of the original object.
    pub storage_key: String,
    /// Plain URL of the original object.
    pub storage_url: String,
    /// Storage key of the thumbnail; present only with its URL.
    pub thumbnail_storage_key: Option<String>,
    /// Plain URL of the thumbnail; present only with its key.
    pub thumbnail_storage_url: Option<String>,
    /// Alternative text for accessibility.
    pub alt_text: Option<String>,
    /// Caption shown with the image.
    pub caption: Option<String>,
    /// Position within the post; ties allowed, ordering is stable by
    /// display order then id.
    pub display_order: i32,
    /// Whether the image is the post's featured image.
    pub featured: bool,
    /// Set once at creation.
    pub uploaded_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped on every metadata mutation.
    pub version: i64,
}

/// One uploaded file entering the pipeline.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Raw upload bytes.
    pub bytes: Bytes,
    /// Client-declared MIME type.
    pub content_type: String,
    /// Client-supplied filename (unsanitized).
    pub original_filename: String,
}

/// Caller-supplied metadata accompanying an upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    /// Alternative text.
    #[serde(default)]
    pub alt_text: Option<String>,
    /// Caption.
    #[serde(default)]
    pub caption: Option<String>,
    /// Position within the post; defaults to the submission index.
    #[serde(default)]
    pub display_order: Option<i32>,
    /// Featured flag; defaults to false.
    #[serde(default)]
    pub featured: Option<bool>,
}

impl UploadMetadata {
    /// Default metadata for the file at `index` in a submission.
    #[must_use]
    pub fn default_for_index(index: i32) -> Self {
        Self {
            display_order: Some(index),
            ..Self::default()
        }
    }
}

/// Input for creating an image record; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct CreateImageInput {
    /// Owning post.
    pub post_id: Uuid,
    /// Server-generated storage name.
    pub filename: String,
    /// Sanitized client-supplied name.
    pub original_filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Original object key.
    pub storage_key: String,
    /// Original object URL.
    pub storage_url: String,
    /// Thumbnail object key, paired with its URL.
    pub thumbnail_storage_key: Option<String>,
    /// Thumbnail object URL, paired with its key.
    pub thumbnail_storage_url: Option<String>,
    /// Alternative text.
    pub alt_text: Option<String>,
    /// Caption.
    pub caption: Option<String>,
    /// Position within the post.
    pub display_order: i32,
    /// Featured flag.
    pub featured: bool,
}

/// Partial metadata update.
///
/// Text fields are tri-state: absent leaves the field untouched, an explicit
/// null clears it, a value overwrites it. `display_order` and `featured` are
/// not nullable, so a single level of optionality suffices. There is no
/// hidden defaulting: only supplied fields change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatch {
    /// Alternative text: absent / null / value.
    #[serde(default, with = "serde_with::rust::double_option")]
    pub alt_text: Option<Option<String>>,
    /// Caption: absent / null / value.
    #[serde(default, with = "serde_with::rust::double_option")]
    pub caption: Option<Option<String>>,
    /// New position within the post.
    #[serde(default)]
    pub display_order: Option<i32>,
    /// New featured flag.
    #[serde(default)]
    pub featured: Option<bool>,
}

/// Failure detail for one slot of a batch upload.
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    /// Client-supplied filename of the failed slot.
    pub original_filename: String,
    /// Why the slot failed.
    pub error: MediaError,
}

/// Aggregate outcome of a batch upload.
///
/// Partial success is a first-class outcome: persisted images and per-slot
/// failures are reported side by side.
#[derive(Debug, Default)]
pub struct BatchUploadOutcome {
    /// Successfully persisted images.
    pub images: Vec<PostImage>,
    /// Per-slot failures, in submission order.
    pub failures: Vec<BatchFailure>,
}

impl BatchUploadOutcome {
    /// True when every slot persisted.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}
