//! Media service tests against in-memory collaborators.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use uuid::Uuid;

use super::*;
use crate::storage::{BlobStore, ObjectKeys, PresignedUrl, StorageError};
use crate::transform::TransformEngine;

/// In-memory blob store with fault injection.
struct InMemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    max_size: u64,
    fail_put_containing: Option<&'static str>,
    fail_delete: bool,
}

impl InMemoryStore {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            max_size: 10 * 1024 * 1024,
            fail_put_containing: None,
            fail_delete: false,
        }
    }

    fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn has_key(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

impl BlobStore for InMemoryStore {
    fn object_keys(&self, original_filename: &str) -> ObjectKeys {
        ObjectKeys::generate("post-images", "thumbnails", original_filename)
    }

    fn url_for(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }

    fn max_object_size(&self) -> u64 {
        self.max_size
    }

    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        if let Some(marker) = self.fail_put_containing
            && key.contains(marker)
        {
            return Err(StorageError::operation("injected put failure"));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_delete {
            return Err(StorageError::operation("injected delete failure"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_read(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        Ok(PresignedUrl {
            url: format!("https://signed.test/{key}?expires={}", ttl.as_secs()),
            method: "GET".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap()),
            headers: HashMap::new(),
        })
    }
}

/// In-memory metadata repository.
struct MockImageRepository {
    images: Mutex<HashMap<Uuid, PostImage>>,
    posts: Mutex<HashMap<Uuid, Uuid>>,
}

impl MockImageRepository {
    fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            posts: Mutex::new(HashMap::new()),
        }
    }

    fn add_post(&self, post_id: Uuid, owner: Uuid) {
        self.posts.lock().unwrap().insert(post_id, owner);
    }

    fn image_count(&self) -> usize {
        self.images.lock().unwrap().len()
    }
}

impl ImageRepository for MockImageRepository {
    async fn create(&self, input: CreateImageInput) -> Result<PostImage, MediaError> {
        let image = PostImage {
            id: Uuid::new_v4(),
            post_id: input.post_id,
            filename: input.filename,
            original_filename: input.original_filename,
            content_type: input.content_type,
            file_size: input.file_size,
            storage_key: input.storage_key,
            storage_url: input.storage_url,
            thumbnail_storage_key: input.thumbnail_storage_key,
            thumbnail_storage_url: input.thumbnail_storage_url,
            alt_text: input.alt_text,
            caption: input.caption,
            display_order: input.display_order,
            featured: input.featured,
            uploaded_at: Utc::now(),
            version: 0,
        };
        self.images
            .lock()
            .unwrap()
            .insert(image.id, image.clone());
        Ok(image)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostImage>, MediaError> {
        Ok(self.images.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_post(&self, post_id: Uuid) -> Result<Vec<PostImage>, MediaError> {
        let mut images: Vec<PostImage> = self
            .images
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.post_id == post_id)
            .cloned()
            .collect();
        images.sort_by_key(|i| (i.display_order, i.id));
        Ok(images)
    }

    async fn update_metadata(
        &self,
        id: Uuid,
        patch: ImagePatch,
    ) -> Result<Option<PostImage>, MediaError> {
        let mut images = self.images.lock().unwrap();
        let Some(image) = images.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(alt_text) = patch.alt_text {
            image.alt_text = alt_text;
        }
        if let Some(caption) = patch.caption {
            image.caption = caption;
        }
        if let Some(display_order) = patch.display_order {
            image.display_order = display_order;
        }
        if let Some(featured) = patch.featured {
            image.featured = featured;
        }
        image.version += 1;
        Ok(Some(image.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, MediaError> {
        Ok(self.images.lock().unwrap().remove(&id).is_some())
    }

    async fn post_exists(&self, post_id: Uuid) -> Result<bool, MediaError> {
        Ok(self.posts.lock().unwrap().contains_key(&post_id))
    }

    async fn post_owned_by(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, MediaError> {
        Ok(self.posts.lock().unwrap().get(&post_id) == Some(&user_id))
    }
}

type TestService = MediaService<MockImageRepository, InMemoryStore>;

struct Fixture {
    service: Arc<TestService>,
    repo: Arc<MockImageRepository>,
    store: Arc<InMemoryStore>,
    post_id: Uuid,
    owner: Uuid,
}

fn fixture() -> Fixture {
    fixture_with_store(InMemoryStore::new())
}

fn fixture_with_store(store: InMemoryStore) -> Fixture {
    let store = Arc::new(store);
    let repo = Arc::new(MockImageRepository::new());
    let post_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    repo.add_post(post_id, owner);

    let service = Arc::new(MediaService::new(
        Arc::clone(&store),
        Arc::new(TransformEngine::new(32)),
        Arc::clone(&repo),
    ));

    Fixture {
        service,
        repo,
        store,
        post_id,
        owner,
    }
}

fn png_file(width: u32, height: u32, name: &str) -> UploadedFile {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("test png should encode");
    UploadedFile {
        bytes: Bytes::from(bytes),
        content_type: "image/png".to_string(),
        original_filename: name.to_string(),
    }
}

/// A text payload with an image content type, like a renamed `.jpg`.
fn mislabeled_file(name: &str) -> UploadedFile {
    UploadedFile {
        bytes: Bytes::from_static(b"this is plain text, not an image"),
        content_type: "image/jpeg".to_string(),
        original_filename: name.to_string(),
    }
}

#[tokio::test]
async fn test_upload_happy_path() {
    let fx = fixture();

    let image = fx
        .service
        .upload_image(fx.post_id, png_file(64, 48, "My Photo.png"), UploadMetadata::default())
        .await
        .expect("upload should succeed");

    // Two blobs: original and thumbnail.
    assert_eq!(fx.store.object_count(), 2);
    assert!(fx.store.has_key(&image.storage_key));
    assert!(fx.store.has_key(image.thumbnail_storage_key.as_deref().unwrap()));

    assert_eq!(image.post_id, fx.post_id);
    assert_eq!(image.content_type, "image/png");
    assert_eq!(image.original_filename, "My_Photo.png");
    assert!(image.filename.ends_with(".png"));
    assert!(image.storage_url.starts_with("https://cdn.test/post-images/"));
    assert!(image
        .thumbnail_storage_url
        .as_deref()
        .unwrap()
        .starts_with("https://cdn.test/thumbnails/"));
    assert_eq!(image.display_order, 0);
    assert!(!image.featured);
    assert_eq!(image.version, 0);
    assert!(image.file_size > 0);
    assert_eq!(fx.repo.image_count(), 1);
}

#[tokio::test]
async fn test_upload_roundtrip_all_supported_types() {
    let cases = [
        ("image/png", ImageFormat::Png, "a.png"),
        ("image/jpeg", ImageFormat::Jpeg, "a.jpg"),
        ("image/gif", ImageFormat::Gif, "a.gif"),
        ("image/webp", ImageFormat::WebP, "a.webp"),
        ("image/bmp", ImageFormat::Bmp, "a.bmp"),
    ];

    for (content_type, format, name) in cases {
        let fx = fixture();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([10, 20, 30])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format)
            .expect("test image should encode");
        let file = UploadedFile {
            bytes: Bytes::from(bytes),
            content_type: content_type.to_string(),
            original_filename: name.to_string(),
        };
        let size = i64::try_from(file.bytes.len()).unwrap();

        let uploaded = fx
            .service
            .upload_image(fx.post_id, file, UploadMetadata::default())
            .await
            .unwrap_or_else(|e| panic!("{content_type} upload failed: {e}"));

        let fetched = fx.service.get_by_id(uploaded.id).await.unwrap();
        assert_eq!(fetched.content_type, content_type);
        assert_eq!(fetched.file_size, size);
        assert!(!fetched.storage_url.is_empty());
        assert!(!fetched.thumbnail_storage_url.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_upload_thumbnail_pair_complete() {
    let fx = fixture();
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(64, 48, "a.png"), UploadMetadata::default())
        .await
        .unwrap();

    // The thumbnail fields come as a pair, never partially populated.
    assert_eq!(
        image.thumbnail_storage_key.is_some(),
        image.thumbnail_storage_url.is_some()
    );
    assert!(image.thumbnail_storage_key.is_some());
}

#[tokio::test]
async fn test_upload_rejects_unsupported_content_type() {
    let fx = fixture();
    let mut file = png_file(16, 16, "doc.pdf");
    file.content_type = "application/pdf".to_string();

    let err = fx
        .service
        .upload_image(fx.post_id, file, UploadMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::InvalidFormat(_)));
    // No orphan writes.
    assert_eq!(fx.store.object_count(), 0);
    assert_eq!(fx.repo.image_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_mislabeled_payload() {
    let fx = fixture();

    let err = fx
        .service
        .upload_image(fx.post_id, mislabeled_file("renamed.jpg"), UploadMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::InvalidFormat(_)));
    assert_eq!(fx.store.object_count(), 0);
    assert_eq!(fx.repo.image_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let fx = fixture();
    let file = UploadedFile {
        bytes: Bytes::new(),
        content_type: "image/png".to_string(),
        original_filename: "empty.png".to_string(),
    };

    let err = fx
        .service
        .upload_image(fx.post_id, file, UploadMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::InvalidFormat(_)));
    assert_eq!(fx.store.object_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let mut store = InMemoryStore::new();
    store.max_size = 64;
    let fx = fixture_with_store(store);

    let err = fx
        .service
        .upload_image(fx.post_id, png_file(64, 64, "big.png"), UploadMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::FileTooLarge { .. }));
    assert_eq!(fx.store.object_count(), 0);
}

#[tokio::test]
async fn test_upload_unknown_post() {
    let fx = fixture();
    let err = fx
        .service
        .upload_image(Uuid::new_v4(), png_file(16, 16, "a.png"), UploadMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::PostNotFound(_)));
}

#[tokio::test]
async fn test_upload_rejects_negative_display_order() {
    let fx = fixture();
    let metadata = UploadMetadata {
        display_order: Some(-1),
        ..UploadMetadata::default()
    };
    let err = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), metadata)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::InvalidDisplayOrder(-1)));
}

#[tokio::test]
async fn test_upload_thumbnail_store_failure_keeps_original_no_row() {
    let mut store = InMemoryStore::new();
    store.fail_put_containing = Some("_thumb");
    let fx = fixture_with_store(store);

    let err = fx
        .service
        .upload_image(fx.post_id, png_file(64, 48, "a.png"), UploadMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::UploadFailed(_)));
    // The original survives the failed thumbnail write; no metadata row.
    assert_eq!(fx.store.object_count(), 1);
    assert_eq!(fx.repo.image_count(), 0);
}

#[tokio::test]
async fn test_batch_partial_success() {
    let fx = fixture();
    let files = vec![
        png_file(32, 32, "one.png"),
        mislabeled_file("two.jpg"),
        png_file(32, 32, "three.png"),
    ];

    let outcome = fx
        .service
        .upload_batch(fx.post_id, files, None)
        .await
        .expect("batch should run");

    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.images.len(), 2);
    assert_eq!(outcome.failures.len(), 1);

    let failure = &outcome.failures[0];
    assert_eq!(failure.index, 1);
    assert_eq!(failure.original_filename, "two.jpg");
    assert!(matches!(failure.error, MediaError::InvalidFormat(_)));

    // Successful slots kept their submission-index display order.
    let mut orders: Vec<i32> = outcome.images.iter().map(|i| i.display_order).collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![0, 2]);

    // Only the two good files wrote blobs (2 objects each).
    assert_eq!(fx.store.object_count(), 4);
    assert_eq!(fx.repo.image_count(), 2);
}

#[tokio::test]
async fn test_batch_all_succeed() {
    let fx = fixture();
    let files = vec![png_file(32, 32, "a.png"), png_file(32, 32, "b.png")];

    let outcome = fx.service.upload_batch(fx.post_id, files, None).await.unwrap();

    assert!(outcome.all_succeeded());
    assert_eq!(outcome.images.len(), 2);
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn test_batch_metadata_reconciliation() {
    let fx = fixture();
    let files = vec![
        png_file(16, 16, "a.png"),
        png_file(16, 16, "b.png"),
        png_file(16, 16, "c.png"),
    ];
    // Only the first slot has caller metadata; its order is explicit.
    let metadata = vec![UploadMetadata {
        caption: Some("lead".to_string()),
        display_order: Some(7),
        ..UploadMetadata::default()
    }];

    let outcome = fx
        .service
        .upload_batch(fx.post_id, files, Some(metadata))
        .await
        .unwrap();
    assert!(outcome.all_succeeded());

    let mut orders: Vec<i32> = outcome.images.iter().map(|i| i.display_order).collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![1, 2, 7]);

    let lead = outcome
        .images
        .iter()
        .find(|i| i.display_order == 7)
        .unwrap();
    assert_eq!(lead.caption.as_deref(), Some("lead"));
}

#[tokio::test]
async fn test_batch_unknown_post() {
    let fx = fixture();
    let err = fx
        .service
        .upload_batch(Uuid::new_v4(), vec![png_file(16, 16, "a.png")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::PostNotFound(_)));
}

#[test]
fn test_reconcile_metadata_pads_and_defaults() {
    let reconciled = reconcile_metadata(3, None);
    let orders: Vec<Option<i32>> = reconciled.iter().map(|m| m.display_order).collect();
    assert_eq!(orders, vec![Some(0), Some(1), Some(2)]);

    let partial = vec![
        UploadMetadata {
            alt_text: Some("kept".to_string()),
            ..UploadMetadata::default()
        },
        UploadMetadata {
            display_order: Some(9),
            ..UploadMetadata::default()
        },
    ];
    let reconciled = reconcile_metadata(3, Some(partial));
    assert_eq!(reconciled.len(), 3);
    assert_eq!(reconciled[0].alt_text.as_deref(), Some("kept"));
    assert_eq!(reconciled[0].display_order, Some(0));
    assert_eq!(reconciled[1].display_order, Some(9));
    assert_eq!(reconciled[2].display_order, Some(2));
}

#[tokio::test]
async fn test_update_metadata_partial_overwrite() {
    let fx = fixture();
    let metadata = UploadMetadata {
        alt_text: Some("original alt".to_string()),
        display_order: Some(4),
        ..UploadMetadata::default()
    };
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), metadata)
        .await
        .unwrap();

    let patch = ImagePatch {
        caption: Some(Some("x".to_string())),
        ..ImagePatch::default()
    };
    let updated = fx.service.update_metadata(image.id, patch).await.unwrap();

    assert_eq!(updated.caption.as_deref(), Some("x"));
    // Untouched fields survive; version bumps by exactly one.
    assert_eq!(updated.alt_text.as_deref(), Some("original alt"));
    assert_eq!(updated.display_order, 4);
    assert!(!updated.featured);
    assert_eq!(updated.version, image.version + 1);
}

#[tokio::test]
async fn test_update_metadata_explicit_null_clears() {
    let fx = fixture();
    let metadata = UploadMetadata {
        alt_text: Some("to be cleared".to_string()),
        ..UploadMetadata::default()
    };
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), metadata)
        .await
        .unwrap();

    let patch = ImagePatch {
        alt_text: Some(None),
        ..ImagePatch::default()
    };
    let updated = fx.service.update_metadata(image.id, patch).await.unwrap();
    assert!(updated.alt_text.is_none());
}

#[tokio::test]
async fn test_update_metadata_not_found() {
    let fx = fixture();
    let err = fx
        .service
        .update_metadata(Uuid::new_v4(), ImagePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_removes_blobs_then_row() {
    let fx = fixture();
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), UploadMetadata::default())
        .await
        .unwrap();
    assert_eq!(fx.store.object_count(), 2);

    fx.service.delete(image.id).await.expect("delete should succeed");

    assert_eq!(fx.store.object_count(), 0);
    assert_eq!(fx.repo.image_count(), 0);
}

#[tokio::test]
async fn test_delete_blob_failure_keeps_row() {
    let fx = fixture();
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), UploadMetadata::default())
        .await
        .unwrap();

    // Re-point a service at a delete-refusing store but the original repo.
    let mut store = InMemoryStore::new();
    store.fail_delete = true;
    let service: Arc<TestService> = Arc::new(MediaService::new(
        Arc::new(store),
        Arc::new(TransformEngine::new(32)),
        Arc::clone(&fx.repo),
    ));

    let err = service.delete(image.id).await.unwrap_err();
    assert!(matches!(err, MediaError::Storage(_)));
    // The metadata row must survive a failed blob deletion.
    assert_eq!(fx.repo.image_count(), 1);
}

#[tokio::test]
async fn test_delete_not_found() {
    let fx = fixture();
    let err = fx.service.delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, MediaError::NotFound(_)));
}

#[tokio::test]
async fn test_list_by_post_ordering() {
    let fx = fixture();
    for order in [2, 0, 1] {
        let metadata = UploadMetadata {
            display_order: Some(order),
            ..UploadMetadata::default()
        };
        fx.service
            .upload_image(fx.post_id, png_file(16, 16, "a.png"), metadata)
            .await
            .unwrap();
    }

    let images = fx.service.list_by_post(fx.post_id).await.unwrap();
    let orders: Vec<i32> = images.iter().map(|i| i.display_order).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_get_by_id_roundtrip() {
    let fx = fixture();
    let uploaded = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), UploadMetadata::default())
        .await
        .unwrap();

    let fetched = fx.service.get_by_id(uploaded.id).await.unwrap();
    assert_eq!(fetched.content_type, uploaded.content_type);
    assert_eq!(fetched.file_size, uploaded.file_size);
    assert!(!fetched.storage_url.is_empty());
    assert!(!fetched.thumbnail_storage_url.unwrap().is_empty());
}

#[tokio::test]
async fn test_presigned_url() {
    let fx = fixture();
    let image = fx
        .service
        .upload_image(fx.post_id, png_file(16, 16, "a.png"), UploadMetadata::default())
        .await
        .unwrap();

    let presigned = fx.service.presigned_url(image.id, 10).await.unwrap();
    assert!(presigned.url.contains(&image.storage_key));
    assert!(presigned.url.contains("expires=600"));
}

#[tokio::test]
async fn test_presigned_url_requires_positive_expiration() {
    let fx = fixture();
    for minutes in [0, -5] {
        let err = fx
            .service
            .presigned_url(Uuid::new_v4(), minutes)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidExpiration));
    }
}

#[tokio::test]
async fn test_presigned_url_not_found() {
    let fx = fixture();
    let err = fx.service.presigned_url(Uuid::new_v4(), 10).await.unwrap_err();
    assert!(matches!(err, MediaError::NotFound(_)));
}

#[tokio::test]
async fn test_verify_post_ownership() {
    let fx = fixture();

    assert!(fx
        .service
        .verify_post_ownership(fx.post_id, fx.owner)
        .await
        .is_ok());

    let err = fx
        .service
        .verify_post_ownership(fx.post_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::PermissionDenied(_)));

    let err = fx
        .service
        .verify_post_ownership(Uuid::new_v4(), fx.owner)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::PostNotFound(_)));
}
