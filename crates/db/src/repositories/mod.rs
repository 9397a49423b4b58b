//! Repository implementations for data access.

mod post_image;

pub use post_image::PostImageRepository;
