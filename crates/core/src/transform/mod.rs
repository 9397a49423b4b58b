//! Image transform engine.
//!
//! Decodes uploaded buffers, derives resized/thumbnail variants, and
//! re-encodes them in the same format family as the input. Pure CPU code:
//! callers are expected to run it on the blocking pool
//! (`tokio::task::spawn_blocking`) so pipeline fan-out is never stalled.

mod engine;
mod error;

pub use engine::{EncodedImage, TransformEngine, format_for_content_type};
pub use error::TransformError;
