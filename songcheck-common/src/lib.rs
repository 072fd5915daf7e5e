//! # songcheck common library
//!
//! Shared code for the songcheck crates:
//! - Common error type
//! - Bootstrap TOML configuration and root folder resolution
//! - Atomic file writes
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;

pub use error::{Error, Result};
