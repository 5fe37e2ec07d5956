//! Core types, errors, and configuration for FerroDB Auth.
//!
//! This crate provides the foundational pieces shared by the auth subsystem:
//! - Domain types for roles, permission grants, and row operations
//! - The replicated command envelope and upgrade state
//! - Centralized postcard codec
//! - Error types using snafu, with a machine-readable error-code catalog
//! - Validated runtime configuration

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use config::AuthConfig;
pub use error::{AuthError, ErrorCode, LogError, Result};
pub use types::*;
