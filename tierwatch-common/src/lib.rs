//! # tierwatch common library
//!
//! Shared code for the tierwatch crates:
//! - Error type and result alias
//! - Bootstrap configuration (TOML + root folder resolution)
//! - Database pool initialization
//! - Timestamp helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
