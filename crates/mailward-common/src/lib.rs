//! Mailward Common - Shared types and utilities
//!
//! This crate provides common types, configuration, and the error type
//! shared across all Mailward components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
