//! Initial schema: posts and post_images.
//!
//! The posts table carries only the columns the media pipeline reads;
//! everything else about posts belongs to the publishing subsystem.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(INITIAL_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS post_images CASCADE; DROP TABLE IF EXISTS posts CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const INITIAL_SQL: &str = r"
-- Posts: the media pipeline only reads id and author_id
CREATE TABLE posts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    author_id UUID NOT NULL,
    title VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_posts_author ON posts(author_id);

-- Image metadata rows; a row is only written after its blobs are stored
CREATE TABLE post_images (
    id UUID PRIMARY KEY,
    post_id UUID NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    filename VARCHAR(255) NOT NULL,
    original_filename VARCHAR(255) NOT NULL,
    content_type VARCHAR(100) NOT NULL,
    file_size BIGINT NOT NULL,
    storage_key VARCHAR(512) NOT NULL,
    storage_url VARCHAR(512) NOT NULL,
    thumbnail_storage_key VARCHAR(512),
    thumbnail_storage_url VARCHAR(512),
    alt_text VARCHAR(255),
    caption VARCHAR(512),
    display_order INTEGER NOT NULL DEFAULT 0,
    featured BOOLEAN NOT NULL DEFAULT FALSE,
    uploaded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    version BIGINT NOT NULL DEFAULT 0,
    CONSTRAINT chk_display_order_non_negative CHECK (display_order >= 0),
    -- thumbnail key/url come as a pair, never partially populated
    CONSTRAINT chk_thumbnail_pair CHECK (
        (thumbnail_storage_key IS NULL) = (thumbnail_storage_url IS NULL)
    )
);

-- Listing order within a post
CREATE INDEX idx_post_images_post ON post_images(post_id, display_order, id);

-- Blob reconciliation lookups
CREATE INDEX idx_post_images_storage_key ON post_images(storage_key);
";
