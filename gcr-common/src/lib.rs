//! # GCR Common Library
//!
//! Shared code for generation-callback reconciliation services:
//! - Error types
//! - Bootstrap TOML configuration and config file resolution
//! - Timestamp and identifier utilities

pub mod config;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
