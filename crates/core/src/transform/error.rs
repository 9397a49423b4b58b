//! Transform error types.

use thiserror::Error;

/// Image transform errors.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Content type has no corresponding encodable image format.
    #[error("unsupported image content type: {0}")]
    UnsupportedFormat(String),

    /// Source or target dimensions are degenerate.
    #[error("image has zero area")]
    ZeroArea,

    /// The buffer could not be decoded as the declared format.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// Re-encoding the derived image failed.
    #[error("failed to encode image: {0}")]
    Encode(String),
}
