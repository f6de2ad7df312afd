//! # MMSA Common Library
//!
//! Shared code for the multimodal sentiment services:
//! - Common error type
//! - Configuration file resolution and atomic TOML write-back
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
