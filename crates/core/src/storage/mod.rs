//! Blob store client for image objects using Apache OpenDAL.
//!
//! This module provides vendor-agnostic object storage with support for:
//! - S3-compatible: Cloudflare R2, Supabase Storage, AWS S3, DigitalOcean Spaces
//! - Local filesystem (development only)
//!
//! The `BlobStore` trait is the seam the media pipeline talks through; the
//! `StorageService` is the production implementation over an OpenDAL
//! `Operator`.

mod config;
mod error;
mod service;

pub use config::{StorageConfig, StorageProvider};
pub use error::StorageError;
pub use service::{BlobStore, ObjectKeys, PresignedUrl, StorageService, sanitize_filename};
