//! Shared configuration and auth primitives for Penned.
//!
//! This crate provides the pieces every other crate needs:
//! - Application configuration management
//! - JWT claims and token validation

pub mod auth;
pub mod config;
pub mod jwt;

pub use auth::Claims;
pub use config::AppConfig;
pub use jwt::{JwtConfig, JwtError, JwtService};
