//! Song catalog operations
//!
//! [`Catalog`] owns the pool; every request works through its own [`CatalogSession`], which
//! holds one pooled connection and returns it to the pool when dropped (including on early
//! returns and errors).

use crate::db::models::SongRecord;
use crate::{Error, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

/// Handle to the durable song catalog
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Acquire a scoped session for one request
    pub async fn session(&self) -> Result<CatalogSession> {
        let conn = self.pool.acquire().await?;
        Ok(CatalogSession { conn })
    }
}

/// One request's connection to the catalog
pub struct CatalogSession {
    conn: PoolConnection<Sqlite>,
}

impl CatalogSession {
    /// Insert a new record
    ///
    /// Fails with [`Error::DuplicatePath`] when `stems_path` is already catalogued; uniqueness
    /// is enforced by the table constraint, not by a prior lookup.
    pub async fn insert(&mut self, filename: &str, stems_path: &str) -> Result<SongRecord> {
        let result = sqlx::query("INSERT INTO songs (filename, stems_path) VALUES (?, ?)")
            .bind(filename)
            .bind(stems_path)
            .execute(&mut *self.conn)
            .await;

        match result {
            Ok(done) => Ok(SongRecord {
                id: done.last_insert_rowid(),
                filename: filename.to_string(),
                stems_path: stems_path.to_string(),
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::DuplicatePath(stems_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All records, most recently inserted first
    pub async fn list(&mut self) -> Result<Vec<SongRecord>> {
        let rows = sqlx::query("SELECT id, filename, stems_path FROM songs ORDER BY id DESC")
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(rows.iter().map(song_from_row).collect())
    }

    /// Look up one record by id
    pub async fn get(&mut self, id: i64) -> Result<SongRecord> {
        let row = sqlx::query("SELECT id, filename, stems_path FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref()
            .map(song_from_row)
            .ok_or_else(|| Error::NotFound(format!("song {}", id)))
    }

    /// Delete one record by id
    pub async fn delete(&mut self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("song {}", id)));
        }

        Ok(())
    }
}

fn song_from_row(row: &SqliteRow) -> SongRecord {
    SongRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        stems_path: row.get("stems_path"),
    }
}
