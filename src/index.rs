//! Persistent vector index with metadata-filtered similarity search.
//!
//! One SQLite table holds embedding, text, and provenance metadata per
//! chunk, keyed by the deterministic chunk id — upserting an already-known
//! id overwrites the record, which makes re-ingestion idempotent at the
//! record level. Queries filter on exact branch and year first, then rank
//! the surviving rows by cosine distance in process.
//!
//! The corpus is thousands of chunks, not millions; a linear scan over the
//! filtered partition beats maintaining an ANN structure here.

use std::sync::Arc;

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::models::{Category, ChunkRecord, QueryHit};

pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        Self { pool, embedder }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Embed and store a batch of chunk records, overwriting any existing
    /// records with the same ids.
    pub async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != records.len() {
            return Err(Error::index(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                records.len()
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::index(e.to_string()))?;

        for (record, vector) in records.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunk_records (id, branch, year, category, filename, link, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    branch = excluded.branch,
                    year = excluded.year,
                    category = excluded.category,
                    filename = excluded.filename,
                    link = excluded.link,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.id)
            .bind(&record.meta.branch)
            .bind(record.meta.year as i64)
            .bind(record.meta.category.as_str())
            .bind(&record.meta.filename)
            .bind(&record.meta.link)
            .bind(&record.text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::index(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| Error::index(e.to_string()))?;
        Ok(())
    }

    /// Nearest chunks to `question` within one branch/year partition,
    /// ranked by ascending cosine distance.
    ///
    /// Degrades to an empty list on any failure — retrieval callers would
    /// rather answer from nothing than propagate an index fault.
    pub async fn query(&self, question: &str, branch: &str, year: u8, top_k: usize) -> Vec<QueryHit> {
        match self.try_query(question, branch, year, top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, branch, year, "index query failed, returning no hits");
                Vec::new()
            }
        }
    }

    async fn try_query(
        &self,
        question: &str,
        branch: &str,
        year: u8,
        top_k: usize,
    ) -> Result<Vec<QueryHit>> {
        let query_vec = self
            .embedder
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::index("empty embedding response"))?;

        let rows = sqlx::query(
            r#"
            SELECT text, category, filename, link, embedding
            FROM chunk_records
            WHERE branch = ? AND year = ?
            "#,
        )
        .bind(branch.to_uppercase())
        .bind(year as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::index(e.to_string()))?;

        let mut hits: Vec<QueryHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let distance = 1.0 - cosine_similarity(&query_vec, &vector) as f64;
                let category: String = row.get("category");
                QueryHit {
                    content: row.get("text"),
                    filename: row.get("filename"),
                    category: Category::from_str_or_notes(&category).as_str().to_string(),
                    link: row.get("link"),
                    distance,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    /// Total stored chunk records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::index(e.to_string()))?;
        Ok(count)
    }
}
