//! Song catalog persistence
//!
//! One SQLite table (`songs`) holding a record per completed separation job.

pub mod catalog;
pub mod init;
pub mod models;

pub use catalog::{Catalog, CatalogSession};
pub use init::*;
pub use models::SongRecord;
