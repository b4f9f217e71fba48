//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every variant maps to one isolation boundary: a `Config` error skips a
//! branch, `Traversal` skips a folder, `Fetch`/`Extraction`/`Index` skip a
//! single file. Nothing here aborts a sync run — the orchestrator catches
//! these at their origin and folds them into the per-branch statistics.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials or root folder id; the affected branch is skipped.
    #[error("configuration error: {0}")]
    Config(String),

    /// A remote folder could not be listed or classified.
    #[error("folder traversal failed: {0}")]
    Traversal(String),

    /// Download or export of a single file failed.
    #[error("fetch failed for '{filename}': {message}")]
    Fetch { filename: String, message: String },

    /// A parser or the vision path failed with nothing left to fall back to.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Embedding or storage failure. During ingestion this aborts the file
    /// before its manifest mark; at query time it degrades to empty results.
    #[error("index error: {0}")]
    Index(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn traversal(message: impl Into<String>) -> Self {
        Self::Traversal(message.into())
    }

    pub fn fetch(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            filename: filename.into(),
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }
}
