use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per embedded chunk. The id encodes branch/year/file/sequence,
    // so re-ingesting an unchanged document overwrites in place.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_records (
            id TEXT PRIMARY KEY,
            branch TEXT NOT NULL,
            year INTEGER NOT NULL,
            category TEXT NOT NULL,
            filename TEXT NOT NULL,
            link TEXT,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_records_branch_year ON chunk_records(branch, year)",
    )
    .execute(pool)
    .await?;

    // Ingestion manifest: a file id lands here only after its chunks were
    // stored, so a crash mid-ingestion leaves the file eligible for retry.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingested_files (
            file_id TEXT PRIMARY KEY,
            ingested_at INTEGER NOT NULL,
            content_hash TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
