//! Ingestion manifest.
//!
//! A durable set of already-ingested external file ids, keyed in SQLite
//! alongside the vector records. A file id is marked only after its chunks
//! were successfully stored, so a crash mid-ingestion leaves the document
//! eligible for retry on the next run, and an unchanged corpus produces
//! zero embedding work.
//!
//! Identity is by file id alone. The content hash of the fetched bytes is
//! recorded for future change detection, but not consulted: a document
//! edited in place under the same id is never re-ingested. Clear the row
//! by hand to force one.

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::Result;

pub struct Manifest {
    pool: SqlitePool,
}

impl Manifest {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether this file id has already been ingested.
    pub async fn contains(&self, file_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ingested_files WHERE file_id = ?)")
                .bind(file_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Record a file as ingested. Called only after its chunks are stored.
    pub async fn mark(&self, file_id: &str, content_hash: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO ingested_files (file_id, ingested_at, content_hash)
            VALUES (?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                ingested_at = excluded.ingested_at,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(file_id)
        .bind(now)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of ingested files on record.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingested_files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Content hash recorded next to each manifest entry.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
