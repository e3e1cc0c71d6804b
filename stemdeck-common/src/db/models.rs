//! Database models

use serde::{Deserialize, Serialize};

/// One completed separation job
///
/// `stems_path` is unique across the catalog and points at the directory holding one file per
/// stem. Records are never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: i64,
    /// Original upload name as submitted by the client (not unique)
    pub filename: String,
    pub stems_path: String,
}
