//! `SeaORM` entity definitions.

pub mod post_images;
pub mod posts;
