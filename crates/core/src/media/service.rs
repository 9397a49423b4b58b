//! Media service: upload orchestrator, batch coordinator, image access.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use super::error::MediaError;
use super::types::{
    BatchFailure, BatchUploadOutcome, CreateImageInput, ImagePatch, PostImage, UploadMetadata,
    UploadedFile,
};
use crate::storage::{BlobStore, PresignedUrl, sanitize_filename};
use crate::transform::TransformEngine;

/// Repository trait for image metadata persistence.
///
/// Implemented by the db crate. `post_exists`/`post_owned_by` are the two
/// capabilities consumed from the post collaborator; nothing else of the post
/// is touched here.
pub trait ImageRepository: Send + Sync {
    /// Create a new image record; the store assigns the id.
    fn create(
        &self,
        input: CreateImageInput,
    ) -> impl Future<Output = Result<PostImage, MediaError>> + Send;

    /// Find an image by id.
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<PostImage>, MediaError>> + Send;

    /// List a post's images, display order ascending then id ascending.
    fn list_by_post(
        &self,
        post_id: Uuid,
    ) -> impl Future<Output = Result<Vec<PostImage>, MediaError>> + Send;

    /// Apply a partial update and bump the version; `None` when unknown.
    fn update_metadata(
        &self,
        id: Uuid,
        patch: ImagePatch,
    ) -> impl Future<Output = Result<Option<PostImage>, MediaError>> + Send;

    /// Delete an image record.
    fn delete(&self, id: Uuid) -> impl Future<Output = Result<bool, MediaError>> + Send;

    /// Check if a post exists.
    fn post_exists(&self, post_id: Uuid) -> impl Future<Output = Result<bool, MediaError>> + Send;

    /// Check if a post belongs to the given principal.
    fn post_owned_by(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = Result<bool, MediaError>> + Send;
}

/// Reconcile a caller-supplied metadata list against the file count.
///
/// Shorter lists are padded with defaults; entries missing a display order
/// get their submission index.
#[must_use]
pub fn reconcile_metadata(
    file_count: usize,
    metadata_list: Option<Vec<UploadMetadata>>,
) -> Vec<UploadMetadata> {
    let mut list = metadata_list.unwrap_or_default();
    list.truncate(file_count);

    for (index, meta) in list.iter_mut().enumerate() {
        if meta.display_order.is_none() {
            meta.display_order = Some(index_order(index));
        }
    }
    while list.len() < file_count {
        list.push(UploadMetadata::default_for_index(index_order(list.len())));
    }
    list
}

fn index_order(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

/// Media service tying the blob store, the transform engine, and the
/// metadata repository together.
pub struct MediaService<R, B> {
    store: Arc<B>,
    transform: Arc<TransformEngine>,
    repo: Arc<R>,
}

// Cloning shares the underlying collaborators; batch fan-out hands one clone
// to each spawned pipeline task.
impl<R, B> Clone for MediaService<R, B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transform: Arc::clone(&self.transform),
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R, B> MediaService<R, B>
where
    R: ImageRepository,
    B: BlobStore,
{
    /// Create a new media service.
    #[must_use]
    pub fn new(store: Arc<B>, transform: Arc<TransformEngine>, repo: Arc<R>) -> Self {
        Self {
            store,
            transform,
            repo,
        }
    }

    /// Run the full per-file pipeline for one upload.
    ///
    /// Stages: validate, store original, derive thumbnail, store thumbnail,
    /// persist metadata. Validation failures leave no blob behind; a
    /// thumbnail failure after stage 2 keeps the stored original and no
    /// metadata row is written.
    ///
    /// # Errors
    ///
    /// `PostNotFound`, `InvalidFormat`, `FileTooLarge`,
    /// `InvalidDisplayOrder`, `UploadFailed`, `ProcessingFailed`, or a
    /// repository error.
    pub async fn upload_image(
        &self,
        post_id: Uuid,
        file: UploadedFile,
        metadata: UploadMetadata,
    ) -> Result<PostImage, MediaError> {
        if !self.repo.post_exists(post_id).await? {
            return Err(MediaError::post_not_found(post_id));
        }
        if let Some(order) = metadata.display_order
            && order < 0
        {
            return Err(MediaError::InvalidDisplayOrder(order));
        }

        // Stage 1: validate. The decoded image is kept for the transform
        // stage so the buffer is only decoded once.
        if file.bytes.is_empty() {
            return Err(MediaError::InvalidFormat("empty file".to_string()));
        }
        let size = file.bytes.len() as u64;
        let max = self.store.max_object_size();
        if size > max {
            return Err(MediaError::FileTooLarge { size, max });
        }

        let engine = Arc::clone(&self.transform);
        let buf = file.bytes.clone();
        let content_type = file.content_type.clone();
        let decoded = tokio::task::spawn_blocking(move || engine.decode(&buf, &content_type))
            .await
            .map_err(|e| MediaError::internal(e.to_string()))?
            .map_err(|e| MediaError::InvalidFormat(e.to_string()))?;

        // Stage 2: store the original.
        let keys = self.store.object_keys(&file.original_filename);
        self.store
            .put(&keys.key, file.bytes.clone(), &file.content_type)
            .await
            .map_err(MediaError::UploadFailed)?;

        // Stage 3: derive the thumbnail on the blocking pool.
        let engine = Arc::clone(&self.transform);
        let content_type = file.content_type.clone();
        let thumbnail = tokio::task::spawn_blocking(move || {
            engine.thumbnail(&decoded, &content_type)
        })
        .await
        .map_err(|e| MediaError::internal(e.to_string()))?
        .map_err(|e| {
            warn!(
                key = %keys.key,
                error = %e,
                "thumbnail derivation failed, original object retained"
            );
            MediaError::ProcessingFailed(e)
        })?;

        // Stage 4: store the thumbnail.
        self.store
            .put(
                &keys.thumbnail_key,
                Bytes::from(thumbnail.bytes),
                &file.content_type,
            )
            .await
            .map_err(MediaError::UploadFailed)?;

        // Stage 5: persist metadata.
        let input = CreateImageInput {
            post_id,
            filename: keys.filename.clone(),
            original_filename: sanitize_filename(&file.original_filename),
            content_type: file.content_type.clone(),
            file_size: i64::try_from(file.bytes.len()).unwrap_or(i64::MAX),
            storage_url: self.store.url_for(&keys.key),
            thumbnail_storage_url: Some(self.store.url_for(&keys.thumbnail_key)),
            storage_key: keys.key,
            thumbnail_storage_key: Some(keys.thumbnail_key),
            alt_text: metadata.alt_text,
            caption: metadata.caption,
            display_order: metadata.display_order.unwrap_or(0),
            featured: metadata.featured.unwrap_or(false),
        };

        self.repo.create(input).await
    }

    /// Fan out one pipeline per file and join all of them.
    ///
    /// Fail-independent: a slot's failure never aborts its siblings, and
    /// partial success is reported, not raised. Sibling tasks share no
    /// mutable state; there is no ordering guarantee between them.
    ///
    /// # Errors
    ///
    /// `PostNotFound` when the target post is missing; per-slot errors are
    /// absorbed into the outcome's `failures`.
    pub async fn upload_batch(
        &self,
        post_id: Uuid,
        files: Vec<UploadedFile>,
        metadata_list: Option<Vec<UploadMetadata>>,
    ) -> Result<BatchUploadOutcome, MediaError>
    where
        R: 'static,
        B: 'static,
    {
        if !self.repo.post_exists(post_id).await? {
            return Err(MediaError::post_not_found(post_id));
        }

        let metadata = reconcile_metadata(files.len(), metadata_list);

        let mut labels = Vec::with_capacity(files.len());
        let mut handles = Vec::with_capacity(files.len());
        for (index, (file, meta)) in files.into_iter().zip(metadata).enumerate() {
            labels.push((index, file.original_filename.clone()));
            let service = self.clone();
            handles.push(tokio::spawn(async move {
                service.upload_image(post_id, file, meta).await
            }));
        }

        let mut outcome = BatchUploadOutcome::default();
        for ((index, original_filename), joined) in
            labels.into_iter().zip(join_all(handles).await)
        {
            match joined {
                Ok(Ok(image)) => outcome.images.push(image),
                Ok(Err(error)) => {
                    warn!(
                        index,
                        filename = %original_filename,
                        error = %error,
                        "batch slot failed"
                    );
                    outcome.failures.push(BatchFailure {
                        index,
                        original_filename,
                        error,
                    });
                }
                Err(join_error) => {
                    warn!(index, error = %join_error, "batch upload task died");
                    outcome.failures.push(BatchFailure {
                        index,
                        original_filename,
                        error: MediaError::internal(join_error.to_string()),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Overwrite the supplied metadata fields and bump the version.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `InvalidDisplayOrder` for negative orders.
    pub async fn update_metadata(
        &self,
        image_id: Uuid,
        patch: ImagePatch,
    ) -> Result<PostImage, MediaError> {
        if let Some(order) = patch.display_order
            && order < 0
        {
            return Err(MediaError::InvalidDisplayOrder(order));
        }

        self.repo
            .update_metadata(image_id, patch)
            .await?
            .ok_or_else(|| MediaError::not_found(image_id))
    }

    /// Delete an image: original blob, thumbnail blob, then the record.
    ///
    /// A blob-delete failure aborts before the record is touched so the row
    /// never references a deleted object while a live one is orphaned.
    ///
    /// # Errors
    ///
    /// `NotFound`, or the storage error that stopped the deletion.
    pub async fn delete(&self, image_id: Uuid) -> Result<(), MediaError> {
        let image = self
            .repo
            .find_by_id(image_id)
            .await?
            .ok_or_else(|| MediaError::not_found(image_id))?;

        self.store.delete(&image.storage_key).await?;
        if let Some(thumbnail_key) = &image.thumbnail_storage_key {
            self.store.delete(thumbnail_key).await?;
        }

        self.repo.delete(image_id).await?;
        Ok(())
    }

    /// List a post's images, display order ascending then id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository operation fails.
    pub async fn list_by_post(&self, post_id: Uuid) -> Result<Vec<PostImage>, MediaError> {
        self.repo.list_by_post(post_id).await
    }

    /// Get an image by id.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub async fn get_by_id(&self, image_id: Uuid) -> Result<PostImage, MediaError> {
        self.repo
            .find_by_id(image_id)
            .await?
            .ok_or_else(|| MediaError::not_found(image_id))
    }

    /// Generate a time-limited read URL for an image's original object.
    ///
    /// # Errors
    ///
    /// `InvalidExpiration` unless `expiration_minutes` is positive,
    /// `NotFound` for unknown ids, or the storage error.
    pub async fn presigned_url(
        &self,
        image_id: Uuid,
        expiration_minutes: i64,
    ) -> Result<PresignedUrl, MediaError> {
        let minutes = u64::try_from(expiration_minutes)
            .ok()
            .filter(|&m| m > 0)
            .ok_or(MediaError::InvalidExpiration)?;

        let image = self
            .repo
            .find_by_id(image_id)
            .await?
            .ok_or_else(|| MediaError::not_found(image_id))?;

        let url = self
            .store
            .presign_read(&image.storage_key, Duration::from_secs(minutes * 60))
            .await?;
        Ok(url)
    }

    /// Check that the principal owns the post.
    ///
    /// # Errors
    ///
    /// `PostNotFound` when the post is missing, `PermissionDenied` when it
    /// belongs to someone else.
    pub async fn verify_post_ownership(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), MediaError> {
        if !self.repo.post_exists(post_id).await? {
            return Err(MediaError::post_not_found(post_id));
        }
        if !self.repo.post_owned_by(post_id, user_id).await? {
            return Err(MediaError::PermissionDenied(post_id));
        }
        Ok(())
    }
}
