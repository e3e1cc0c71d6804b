//! # StemDeck Common Library
//!
//! Shared code for the StemDeck service:
//! - Error type used by catalog and configuration code
//! - Configuration loading and root folder resolution
//! - Song catalog (SQLite) schema and queries

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
