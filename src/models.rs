//! Core data types flowing through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Drive folder mime type; children with this type are traversed, not fetched.
pub const MIME_FOLDER: &str = "application/vnd.google-apps.folder";

/// One child entry of a remote folder, as returned by the listing API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "webViewLink", default)]
    pub web_view_link: Option<String>,
    #[serde(rename = "modifiedTime", default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == MIME_FOLDER
    }
}

/// A file the crawler has located and classified. Exists only for the
/// duration of one ingestion pass.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub entry: RemoteEntry,
    pub branch: String,
    pub year: u8,
    pub category: Category,
}

/// Closed set of document formats the extractor can dispatch on.
///
/// Google-native documents never reach extraction under their own tag: the
/// fetcher exports them to PDF first, so they arrive as [`DocFormat::Pdf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    /// Fixed-layout paginated document (PDF).
    Pdf,
    /// OOXML word-processor document (.docx, and .doc by optimistic attempt).
    WordDoc,
    /// OOXML spreadsheet (.xlsx).
    Spreadsheet,
    /// OOXML slide deck (.pptx).
    SlideDeck,
    /// Raster image (jpeg, png, webp, bmp, gif).
    Image,
    /// Plain text or CSV.
    PlainText,
    /// Old binary Office formats (.ppt, .xls) with no native parser.
    LegacyOffice,
}

impl DocFormat {
    /// Map a mime type to its extraction format, or `None` if the file type
    /// is not ingestible.
    pub fn from_mime(mime: &str) -> Option<DocFormat> {
        match mime {
            "application/pdf" => Some(DocFormat::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => Some(DocFormat::WordDoc),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(DocFormat::Spreadsheet)
            }
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Some(DocFormat::SlideDeck)
            }
            "application/vnd.ms-powerpoint" | "application/vnd.ms-excel" => {
                Some(DocFormat::LegacyOffice)
            }
            "image/jpeg" | "image/png" | "image/webp" | "image/bmp" | "image/gif" => {
                Some(DocFormat::Image)
            }
            "text/plain" | "text/csv" | "text/markdown" => Some(DocFormat::PlainText),
            _ => None,
        }
    }

    /// Whether a mime type names a Google-native document that must be
    /// exported (to PDF) instead of downloaded.
    pub fn needs_export(mime: &str) -> bool {
        matches!(
            mime,
            "application/vnd.google-apps.document"
                | "application/vnd.google-apps.spreadsheet"
                | "application/vnd.google-apps.presentation"
        )
    }

    /// Whether a mime type is ingestible at all (directly or via export).
    pub fn is_supported(mime: &str) -> bool {
        Self::from_mime(mime).is_some() || Self::needs_export(mime)
    }
}

/// Document role, classified from the enclosing subfolder name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Syllabus,
    Timetable,
    QuestionPaper,
    Notes,
    Assignment,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Syllabus => "syllabus",
            Category::Timetable => "timetable",
            Category::QuestionPaper => "question_paper",
            Category::Notes => "notes",
            Category::Assignment => "assignment",
        }
    }

    pub fn from_str_or_notes(s: &str) -> Category {
        match s {
            "syllabus" => Category::Syllabus,
            "timetable" => Category::Timetable,
            "question_paper" => Category::QuestionPaper,
            "assignment" => Category::Assignment,
            _ => Category::Notes,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside every chunk record.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    /// Uppercase branch code (e.g. `CSE`).
    pub branch: String,
    /// Academic year, 1..=4.
    pub year: u8,
    pub category: Category,
    pub filename: String,
    pub link: Option<String>,
}

/// One persisted unit of retrieval: a chunk of extracted text plus its
/// provenance metadata. The id is deterministic across runs, so upserting
/// the same document again overwrites in place.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub meta: RecordMeta,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub content: String,
    pub filename: String,
    pub category: String,
    pub link: Option<String>,
    /// Cosine distance to the query embedding; smaller is closer.
    pub distance: f64,
}

/// What became of one discovered file during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Chunks were embedded and stored; the manifest now records the file.
    Ingested { chunks: usize },
    /// The manifest already knew this file id.
    AlreadyIngested,
    /// Extraction produced no usable text; not an error.
    NoText,
}

/// Per-branch ingestion counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BranchStats {
    /// Files newly ingested this run.
    pub files: u64,
    /// Chunks written for those files.
    pub chunks: u64,
    /// Files skipped (already known, or no extractable text).
    pub skipped: u64,
    /// Files that failed fetch/extraction/indexing and stayed unmarked.
    pub failed: u64,
}

/// Terminal state of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Complete,
    /// No usable remote configuration; nothing was attempted.
    Skipped,
}

/// Aggregate result of one sync run. Always well-formed, even when
/// individual files or folders failed.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub total_chunks: u64,
    pub branches: std::collections::BTreeMap<String, BranchStats>,
}

impl SyncReport {
    pub fn skipped() -> Self {
        SyncReport {
            status: SyncStatus::Skipped,
            total_chunks: 0,
            branches: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_native_mimes_need_export_and_are_supported() {
        assert!(DocFormat::needs_export("application/vnd.google-apps.document"));
        assert!(DocFormat::is_supported("application/vnd.google-apps.spreadsheet"));
        assert_eq!(DocFormat::from_mime("application/vnd.google-apps.document"), None);
    }

    #[test]
    fn legacy_office_maps_to_legacy_variant() {
        assert_eq!(
            DocFormat::from_mime("application/vnd.ms-powerpoint"),
            Some(DocFormat::LegacyOffice)
        );
        assert_eq!(
            DocFormat::from_mime("application/vnd.ms-excel"),
            Some(DocFormat::LegacyOffice)
        );
    }

    #[test]
    fn unknown_mime_is_unsupported() {
        assert!(!DocFormat::is_supported("application/octet-stream"));
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in [
            Category::Syllabus,
            Category::Timetable,
            Category::QuestionPaper,
            Category::Notes,
            Category::Assignment,
        ] {
            assert_eq!(Category::from_str_or_notes(c.as_str()), c);
        }
        assert_eq!(Category::from_str_or_notes("garbage"), Category::Notes);
    }
}
