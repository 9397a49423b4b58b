//! Post image repository for database operations.
//!
//! Implements the media pipeline's `ImageRepository` trait using SeaORM.
//! Every write is an independent single-row transaction; concurrent batch
//! pipelines never share a row.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::{post_images, posts};
use penned_core::media::{CreateImageInput, ImagePatch, ImageRepository, MediaError, PostImage};

/// Post image repository implementation.
#[derive(Debug, Clone)]
pub struct PostImageRepository {
    db: DatabaseConnection,
}

impl PostImageRepository {
    /// Create a new post image repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl ImageRepository for PostImageRepository {
    async fn create(&self, input: CreateImageInput) -> Result<PostImage, MediaError> {
        let active_model = post_images::ActiveModel {
            id: Set(Uuid::new_v4()),
            post_id: Set(input.post_id),
            filename: Set(input.filename),
            original_filename: Set(input.original_filename),
            content_type: Set(input.content_type),
            file_size: Set(input.file_size),
            storage_key: Set(input.storage_key),
            storage_url: Set(input.storage_url),
            thumbnail_storage_key: Set(input.thumbnail_storage_key),
            thumbnail_storage_url: Set(input.thumbnail_storage_url),
            alt_text: Set(input.alt_text),
            caption: Set(input.caption),
            display_order: Set(input.display_order),
            featured: Set(input.featured),
            uploaded_at: Set(Utc::now().into()),
            version: Set(0),
        };

        let model = active_model
            .insert(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(to_domain(model))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostImage>, MediaError> {
        let model = post_images::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn list_by_post(&self, post_id: Uuid) -> Result<Vec<PostImage>, MediaError> {
        let models = post_images::Entity::find()
            .filter(post_images::Column::PostId.eq(post_id))
            .order_by_asc(post_images::Column::DisplayOrder)
            .order_by_asc(post_images::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(models.into_iter().map(to_domain).collect())
    }

    async fn update_metadata(
        &self,
        id: Uuid,
        patch: ImagePatch,
    ) -> Result<Option<PostImage>, MediaError> {
        let Some(model) = post_images::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?
        else {
            return Ok(None);
        };

        let current_version = model.version;
        let mut active: post_images::ActiveModel = model.into();

        if let Some(alt_text) = patch.alt_text {
            active.alt_text = Set(alt_text);
        }
        if let Some(caption) = patch.caption {
            active.caption = Set(caption);
        }
        if let Some(display_order) = patch.display_order {
            active.display_order = Set(display_order);
        }
        if let Some(featured) = patch.featured {
            active.featured = Set(featured);
        }
        active.version = Set(current_version + 1);

        let updated = active
            .update(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(Some(to_domain(updated)))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, MediaError> {
        let result = post_images::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn post_exists(&self, post_id: Uuid) -> Result<bool, MediaError> {
        let count: u64 = posts::Entity::find_by_id(post_id)
            .count(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(count > 0)
    }

    async fn post_owned_by(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, MediaError> {
        let count: u64 = posts::Entity::find_by_id(post_id)
            .filter(posts::Column::AuthorId.eq(user_id))
            .count(&self.db)
            .await
            .map_err(|e| MediaError::repository(e.to_string()))?;

        Ok(count > 0)
    }
}

/// Convert database model to domain model.
fn to_domain(model: post_images::Model) -> PostImage {
    PostImage {
        id: model.id,
        post_id: model.post_id,
        filename: model.filename,
        original_filename: model.original_filename,
        content_type: model.content_type,
        file_size: model.file_size,
        storage_key: model.storage_key,
        storage_url: model.storage_url,
        thumbnail_storage_key: model.thumbnail_storage_key,
        thumbnail_storage_url: model.thumbnail_storage_url,
        alt_text: model.alt_text,
        caption: model.caption,
        display_order: model.display_order,
        featured: model.featured,
        uploaded_at: model.uploaded_at.with_timezone(&chrono::Utc),
        version: model.version,
    }
}
