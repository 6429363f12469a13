//! Shared utilities, configuration, and error handling for the crowd identity core
//!
//! This crate provides functionality used by every domain crate:
//! - Error taxonomy and result type
//! - Repository error types
//! - Configuration loaded from the environment
//! - Opaque token generation and digests

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;

pub use crypto::{constant_time_eq, generate_token, token_digest};
pub use db::{map_unique_violation, RepositoryError};
pub use error::{AuthFailure, Error, Result, TokenRejection};
