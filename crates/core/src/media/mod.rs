//! Media pipeline: upload orchestration, batch coordination, image access.
//!
//! The per-file pipeline is validate -> store original -> derive thumbnail ->
//! store thumbnail -> persist metadata. Batches fan the pipeline out across
//! independent tasks and join all of them; one file's failure never aborts
//! its siblings.

mod error;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use error::MediaError;
pub use service::{ImageRepository, MediaService, reconcile_metadata};
pub use types::{
    BatchFailure, BatchUploadOutcome, CreateImageInput, ImagePatch, PostImage, UploadMetadata,
    UploadedFile,
};
