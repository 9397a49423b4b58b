//! Post image management routes.
//!
//! Single and batch multipart uploads, metadata CRUD, and presigned access
//! links for a post's images.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{AppState, middleware::AuthUser};
use penned_core::media::{
    BatchUploadOutcome, ImagePatch, MediaError, MediaService, PostImage, UploadMetadata,
    UploadedFile,
};
use penned_core::storage::StorageService;
use penned_db::PostImageRepository;

/// Media service wired to the request's application state.
type ApiMediaService = MediaService<PostImageRepository, StorageService>;

/// Creates the post image routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}/images/single", post(upload_single_image))
        .route("/posts/{post_id}/images/batch", post(upload_image_batch))
        .route("/posts/{post_id}/images", get(list_post_images))
        .route(
            "/posts/{post_id}/images/{image_id}",
            get(get_image).put(update_image_metadata).delete(delete_image),
        )
        .route(
            "/posts/{post_id}/images/{image_id}/presigned",
            get(get_presigned_url),
        )
}

fn media_service(state: &AppState) -> ApiMediaService {
    let repo = PostImageRepository::new((*state.db).clone());
    MediaService::new(
        Arc::clone(&state.storage),
        Arc::clone(&state.transform),
        Arc::new(repo),
    )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for a single image.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    /// Image ID.
    pub id: Uuid,
    /// Owning post ID.
    pub post_id: Uuid,
    /// Sanitized client-supplied filename.
    pub original_filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Plain URL of the original object.
    pub image_url: String,
    /// Plain URL of the thumbnail, when derived.
    pub thumbnail_url: Option<String>,
    /// Alternative text.
    pub alt_text: Option<String>,
    /// Caption.
    pub caption: Option<String>,
    /// Position within the post.
    pub display_order: i32,
    /// Featured flag.
    pub featured: bool,
    /// Upload timestamp (ISO 8601).
    pub uploaded_at: String,
    /// Optimistic-concurrency version.
    pub version: i64,
}

impl From<PostImage> for ImageResponse {
    fn from(image: PostImage) -> Self {
        Self {
            id: image.id,
            post_id: image.post_id,
            original_filename: image.original_filename,
            content_type: image.content_type,
            file_size: image.file_size,
            image_url: image.storage_url,
            thumbnail_url: image.thumbnail_storage_url,
            alt_text: image.alt_text,
            caption: image.caption,
            display_order: image.display_order,
            featured: image.featured,
            uploaded_at: image.uploaded_at.to_rfc3339(),
            version: image.version,
        }
    }
}

/// One failed slot in a batch response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailureResponse {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    /// Client-supplied filename of the failed slot.
    pub original_filename: String,
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// Response for a batch upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    /// Successfully persisted images.
    pub images: Vec<ImageResponse>,
    /// Per-slot failures, in submission order.
    pub failures: Vec<BatchFailureResponse>,
}

impl From<BatchUploadOutcome> for BatchUploadResponse {
    fn from(outcome: BatchUploadOutcome) -> Self {
        Self {
            images: outcome.images.into_iter().map(ImageResponse::from).collect(),
            failures: outcome
                .failures
                .into_iter()
                .map(|f| BatchFailureResponse {
                    index: f.index,
                    original_filename: f.original_filename,
                    error: error_code(&f.error),
                    message: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Query parameters for presigned URL generation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignQuery {
    /// Link lifetime in minutes.
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: i64,
}

fn default_expiration_minutes() -> i64 {
    10
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Machine-readable code for a media error.
fn error_code(error: &MediaError) -> &'static str {
    match error {
        MediaError::InvalidFormat(_) => "invalid_format",
        MediaError::FileTooLarge { .. } => "file_too_large",
        MediaError::UploadFailed(_) => "upload_failed",
        MediaError::ProcessingFailed(_) => "processing_failed",
        MediaError::NotFound(_) => "not_found",
        MediaError::PostNotFound(_) => "post_not_found",
        MediaError::PermissionDenied(_) => "forbidden",
        MediaError::InvalidExpiration => "invalid_expiration",
        MediaError::InvalidDisplayOrder(_) => "invalid_display_order",
        MediaError::Storage(_) => "storage_error",
        MediaError::Repository(_) | MediaError::Internal(_) => "internal_error",
    }
}

/// HTTP status for a media error.
fn error_status(error: &MediaError) -> StatusCode {
    match error {
        MediaError::InvalidFormat(_)
        | MediaError::FileTooLarge { .. }
        | MediaError::InvalidExpiration
        | MediaError::InvalidDisplayOrder(_) => StatusCode::BAD_REQUEST,
        MediaError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        MediaError::NotFound(_) | MediaError::PostNotFound(_) => StatusCode::NOT_FOUND,
        MediaError::ProcessingFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MediaError::UploadFailed(_)
        | MediaError::Storage(_)
        | MediaError::Repository(_)
        | MediaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a media error into a JSON error response.
///
/// Server-side failures get a generic message; client errors carry detail.
fn error_response(err: &MediaError) -> Response {
    let status = error_status(err);
    let message = if status.is_server_error() {
        error!(error = %err, "media operation failed");
        "An error occurred".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        Json(json!({ "error": error_code(err), "message": message })),
    )
        .into_response()
}

fn bad_request(error: &'static str, message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "message": message.into() })),
    )
        .into_response()
}

// ============================================================================
// Multipart Parsing
// ============================================================================

struct SingleUpload {
    file: UploadedFile,
    metadata: Option<UploadMetadata>,
}

struct BatchUpload {
    files: Vec<UploadedFile>,
    metadata_list: Option<Vec<UploadMetadata>>,
}

async fn field_to_file(field: axum::extract::multipart::Field<'_>) -> Result<UploadedFile, Response> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let original_filename = field.file_name().unwrap_or("upload").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| bad_request("invalid_multipart", e.to_string()))?;

    Ok(UploadedFile {
        bytes,
        content_type,
        original_filename,
    })
}

/// Parse the `file` and optional `metadata` parts of a single upload.
async fn parse_single_upload(mut multipart: Multipart) -> Result<SingleUpload, Response> {
    let mut file = None;
    let mut metadata = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request("invalid_multipart", e.to_string()))?
    {
        match field.name() {
            Some("file") => file = Some(field_to_file(field).await?),
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request("invalid_multipart", e.to_string()))?;
                metadata = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| bad_request("invalid_metadata", e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let file =
        file.ok_or_else(|| bad_request("missing_file", "multipart part 'file' is required"))?;
    Ok(SingleUpload { file, metadata })
}

/// Parse the repeated `images` parts and optional `imageMetadata` part of a
/// batch upload.
async fn parse_batch_upload(mut multipart: Multipart) -> Result<BatchUpload, Response> {
    let mut files = Vec::new();
    let mut metadata_list = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request("invalid_multipart", e.to_string()))?
    {
        match field.name() {
            Some("images") => files.push(field_to_file(field).await?),
            Some("imageMetadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request("invalid_multipart", e.to_string()))?;
                metadata_list = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| bad_request("invalid_metadata", e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(bad_request(
            "missing_files",
            "at least one multipart part 'images' is required",
        ));
    }
    Ok(BatchUpload {
        files,
        metadata_list,
    })
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/posts/{post_id}/images/single`
/// Upload one image and derive its thumbnail.
async fn upload_single_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    multipart: Multipart,
) -> Response {
    let service = media_service(&state);

    if let Err(e) = service.verify_post_ownership(post_id, auth.user_id()).await {
        return error_response(&e);
    }

    let upload = match parse_single_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match service
        .upload_image(post_id, upload.file, upload.metadata.unwrap_or_default())
        .await
    {
        Ok(image) => {
            info!(
                post_id = %post_id,
                image_id = %image.id,
                content_type = %image.content_type,
                "Image uploaded"
            );
            (StatusCode::CREATED, Json(ImageResponse::from(image))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST `/posts/{post_id}/images/batch`
/// Upload several images concurrently; partial success is a 206.
async fn upload_image_batch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    multipart: Multipart,
) -> Response {
    let service = media_service(&state);

    if let Err(e) = service.verify_post_ownership(post_id, auth.user_id()).await {
        return error_response(&e);
    }

    let upload = match parse_batch_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match service
        .upload_batch(post_id, upload.files, upload.metadata_list)
        .await
    {
        Ok(outcome) => {
            let status = if outcome.all_succeeded() {
                StatusCode::CREATED
            } else {
                StatusCode::PARTIAL_CONTENT
            };
            info!(
                post_id = %post_id,
                succeeded = outcome.images.len(),
                failed = outcome.failures.len(),
                "Batch upload finished"
            );
            (status, Json(BatchUploadResponse::from(outcome))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET `/posts/{post_id}/images`
/// List a post's images, display order ascending.
async fn list_post_images(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Response {
    let service = media_service(&state);

    match service.list_by_post(post_id).await {
        Ok(images) => {
            let items: Vec<ImageResponse> = images.into_iter().map(ImageResponse::from).collect();
            (StatusCode::OK, Json(json!({ "images": items }))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Fetch an image and check it belongs to the post in the path.
async fn image_in_post(
    service: &ApiMediaService,
    post_id: Uuid,
    image_id: Uuid,
) -> Result<PostImage, Response> {
    match service.get_by_id(image_id).await {
        Ok(image) if image.post_id == post_id => Ok(image),
        Ok(_) => Err(error_response(&MediaError::not_found(image_id))),
        Err(e) => Err(error_response(&e)),
    }
}

/// GET `/posts/{post_id}/images/{image_id}`
/// Get a single image.
async fn get_image(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((post_id, image_id)): Path<(Uuid, Uuid)>,
) -> Response {
    let service = media_service(&state);

    match image_in_post(&service, post_id, image_id).await {
        Ok(image) => (StatusCode::OK, Json(ImageResponse::from(image))).into_response(),
        Err(response) => response,
    }
}

/// GET `/posts/{post_id}/images/{image_id}/presigned`
/// Generate a time-limited access link, returned as a plain-text body.
async fn get_presigned_url(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((post_id, image_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PresignQuery>,
) -> Response {
    let service = media_service(&state);

    if let Err(response) = image_in_post(&service, post_id, image_id).await {
        return response;
    }

    match service
        .presigned_url(image_id, query.expiration_minutes)
        .await
    {
        Ok(presigned) => (StatusCode::OK, presigned.url).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT `/posts/{post_id}/images/{image_id}`
/// Overwrite the supplied metadata fields.
async fn update_image_metadata(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((post_id, image_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<ImagePatch>,
) -> Response {
    let service = media_service(&state);

    if let Err(e) = service.verify_post_ownership(post_id, auth.user_id()).await {
        return error_response(&e);
    }
    if let Err(response) = image_in_post(&service, post_id, image_id).await {
        return response;
    }

    match service.update_metadata(image_id, patch).await {
        Ok(image) => {
            info!(post_id = %post_id, image_id = %image_id, "Image metadata updated");
            (StatusCode::OK, Json(ImageResponse::from(image))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// DELETE `/posts/{post_id}/images/{image_id}`
/// Delete the image's blobs, then its record.
async fn delete_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((post_id, image_id)): Path<(Uuid, Uuid)>,
) -> Response {
    let service = media_service(&state);

    if let Err(e) = service.verify_post_ownership(post_id, auth.user_id()).await {
        return error_response(&e);
    }
    if let Err(response) = image_in_post(&service, post_id, image_id).await {
        return response;
    }

    match service.delete(image_id).await {
        Ok(()) => {
            info!(post_id = %post_id, image_id = %image_id, "Image deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use penned_core::storage::StorageError;
    use penned_core::transform::TransformError;

    fn sample_image() -> PostImage {
        PostImage {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            filename: "abc.png".to_string(),
            original_filename: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            file_size: 2048,
            storage_key: "post-images/abc.png".to_string(),
            storage_url: "https://cdn.test/post-images/abc.png".to_string(),
            thumbnail_storage_key: Some("thumbnails/abc_thumb.png".to_string()),
            thumbnail_storage_url: Some("https://cdn.test/thumbnails/abc_thumb.png".to_string()),
            alt_text: Some("alt".to_string()),
            caption: None,
            display_order: 1,
            featured: false,
            uploaded_at: Utc::now(),
            version: 2,
        }
    }

    #[test]
    fn test_image_response_mapping() {
        let image = sample_image();
        let id = image.id;
        let response = ImageResponse::from(image);

        assert_eq!(response.id, id);
        assert_eq!(response.image_url, "https://cdn.test/post-images/abc.png");
        assert_eq!(
            response.thumbnail_url.as_deref(),
            Some("https://cdn.test/thumbnails/abc_thumb.png")
        );
        assert_eq!(response.display_order, 1);
        assert_eq!(response.version, 2);
    }

    #[test]
    fn test_image_response_serializes_camel_case() {
        let response = ImageResponse::from(sample_image());
        let value = serde_json::to_value(&response).unwrap();

        assert!(value.get("originalFilename").is_some());
        assert!(value.get("thumbnailUrl").is_some());
        assert!(value.get("displayOrder").is_some());
        assert!(value.get("original_filename").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&MediaError::InvalidFormat("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&MediaError::FileTooLarge { size: 2, max: 1 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&MediaError::PermissionDenied(Uuid::new_v4())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            error_status(&MediaError::NotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&MediaError::PostNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&MediaError::ProcessingFailed(TransformError::ZeroArea)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            error_status(&MediaError::UploadFailed(StorageError::operation("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&MediaError::InvalidExpiration),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            error_code(&MediaError::InvalidFormat("x".to_string())),
            "invalid_format"
        );
        assert_eq!(
            error_code(&MediaError::ProcessingFailed(TransformError::ZeroArea)),
            "processing_failed"
        );
        assert_eq!(
            error_code(&MediaError::Repository("x".to_string())),
            "internal_error"
        );
    }

    #[test]
    fn test_presign_query_default() {
        let query: PresignQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.expiration_minutes, 10);
    }
}
