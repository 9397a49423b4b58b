//! Transform engine implementation on top of the `image` crate.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, imageops::FilterType};

use super::error::TransformError;

/// A derived image, re-encoded and ready for storage.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Encoded bytes in the source format family.
    pub bytes: Vec<u8>,
    /// Pixel width of the derived image.
    pub width: u32,
    /// Pixel height of the derived image.
    pub height: u32,
}

/// Map a content type to its image format, deterministically.
///
/// # Errors
///
/// Returns `TransformError::UnsupportedFormat` for anything outside the
/// supported family.
pub fn format_for_content_type(content_type: &str) -> Result<ImageFormat, TransformError> {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/png" => Ok(ImageFormat::Png),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        other => Err(TransformError::UnsupportedFormat(other.to_string())),
    }
}

/// Image transform engine.
///
/// Stateless apart from the configured thumbnail width; safe to share across
/// concurrent pipelines.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    thumbnail_width: u32,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THUMBNAIL_WIDTH)
    }
}

impl TransformEngine {
    /// Default thumbnail target width in pixels.
    pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 300;

    /// Create an engine with the given thumbnail target width.
    #[must_use]
    pub fn new(thumbnail_width: u32) -> Self {
        Self {
            thumbnail_width: thumbnail_width.max(1),
        }
    }

    /// Configured thumbnail target width.
    #[must_use]
    pub const fn thumbnail_width(&self) -> u32 {
        self.thumbnail_width
    }

    /// Decode a buffer as the format declared by its content type.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for unknown content types, `Decode` when the
    /// buffer is not a valid image of that format, `ZeroArea` for degenerate
    /// images.
    pub fn decode(&self, bytes: &[u8], content_type: &str) -> Result<DynamicImage, TransformError> {
        let format = format_for_content_type(content_type)?;
        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(TransformError::ZeroArea);
        }
        Ok(img)
    }

    /// Resize to exact dimensions and re-encode in the source format family.
    ///
    /// Uses Catmull-Rom interpolation for quality-preserving downscaling.
    ///
    /// # Errors
    ///
    /// `ZeroArea` for degenerate targets, `UnsupportedFormat`/`Encode` when
    /// re-encoding fails.
    pub fn resize(
        &self,
        image: &DynamicImage,
        content_type: &str,
        target_width: u32,
        target_height: u32,
    ) -> Result<EncodedImage, TransformError> {
        if target_width == 0 || target_height == 0 {
            return Err(TransformError::ZeroArea);
        }

        let format = format_for_content_type(content_type)?;
        let resized = image.resize_exact(target_width, target_height, FilterType::CatmullRom);

        let mut bytes = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut bytes), format)
            .map_err(|e| TransformError::Encode(e.to_string()))?;

        Ok(EncodedImage {
            bytes,
            width: target_width,
            height: target_height,
        })
    }

    /// Derive a thumbnail at the configured width, preserving aspect ratio.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::resize`].
    pub fn thumbnail(
        &self,
        image: &DynamicImage,
        content_type: &str,
    ) -> Result<EncodedImage, TransformError> {
        self.thumbnail_with_width(image, content_type, self.thumbnail_width)
    }

    /// Derive a thumbnail at an explicit width, preserving aspect ratio.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::resize`].
    pub fn thumbnail_with_width(
        &self,
        image: &DynamicImage,
        content_type: &str,
        target_width: u32,
    ) -> Result<EncodedImage, TransformError> {
        let (width, height) = thumbnail_dimensions(image.width(), image.height(), target_width)?;
        self.resize(image, content_type, width, height)
    }
}

/// Aspect-preserving thumbnail dimensions.
///
/// Height is `round(target_width * original_height / original_width)`,
/// clamped to at least one pixel.
///
/// # Errors
///
/// `ZeroArea` when the source or the target width is degenerate.
pub fn thumbnail_dimensions(
    original_width: u32,
    original_height: u32,
    target_width: u32,
) -> Result<(u32, u32), TransformError> {
    if original_width == 0 || original_height == 0 || target_width == 0 {
        return Err(TransformError::ZeroArea);
    }

    let scaled = u64::from(target_width) * u64::from(original_height);
    let rounded = (scaled + u64::from(original_width) / 2) / u64::from(original_width);
    let height = u32::try_from(rounded).unwrap_or(u32::MAX).max(1);

    Ok((target_width, height))
}
