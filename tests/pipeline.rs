//! End-to-end pipeline tests against an in-memory remote tree, a stub
//! vision model, and a deterministic mock embedder. No network, no real
//! models; everything runs against a temp-dir SQLite database.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use acadex::config::ChunkingConfig;
use acadex::drive::RemoteDrive;
use acadex::embedding::Embedder;
use acadex::error::{Error, Result};
use acadex::extract::TextExtractor;
use acadex::index::VectorIndex;
use acadex::manifest::Manifest;
use acadex::models::{ChunkRecord, RecordMeta, RemoteEntry, SyncStatus, MIME_FOLDER};
use acadex::sync::SyncEngine;
use acadex::vision::VisionModel;
use acadex::{db, migrate};

// ============ Mocks ============

#[derive(Default, Clone)]
struct MockDrive {
    folders: HashMap<String, Vec<RemoteEntry>>,
    contents: HashMap<String, Vec<u8>>,
    fail_downloads: HashSet<String>,
}

impl MockDrive {
    fn folder(&mut self, parent: &str, id: &str, name: &str) {
        self.folders.entry(parent.to_string()).or_default().push(entry(id, name, MIME_FOLDER));
        self.folders.entry(id.to_string()).or_default();
    }

    fn file(&mut self, parent: &str, id: &str, name: &str, mime: &str, content: &[u8]) {
        self.folders.entry(parent.to_string()).or_default().push(entry(id, name, mime));
        self.contents.insert(id.to_string(), content.to_vec());
    }
}

fn entry(id: &str, name: &str, mime: &str) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        web_view_link: Some(format!("https://drive.example/{}", id)),
        modified_time: None,
    }
}

#[async_trait]
impl RemoteDrive for MockDrive {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        self.folders
            .get(folder_id)
            .cloned()
            .ok_or_else(|| Error::traversal(format!("no such folder: {}", folder_id)))
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        if self.fail_downloads.contains(file_id) {
            return Err(Error::fetch(file_id, "injected download failure"));
        }
        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::fetch(file_id, "no content registered"))
    }

    async fn export(&self, file_id: &str, _mime: &str) -> Result<Vec<u8>> {
        self.download(file_id).await
    }
}

struct StubVision {
    reply: String,
    calls: AtomicUsize,
}

impl StubVision {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for StubVision {
    async fn transcribe(&self, _mime: &str, _bytes: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Deterministic embedder: the vector is a byte histogram of the text, so
/// identical texts always land on identical vectors.
struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.01f32; 8];
                for (i, b) in t.bytes().enumerate() {
                    v[i % 8] += b as f32 / 255.0;
                }
                v
            })
            .collect())
    }

    fn dims(&self) -> usize {
        8
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

// ============ Harness ============

async fn build_engine(
    drive: MockDrive,
    vision: Arc<StubVision>,
    branches: &[(&str, &str)],
) -> (TempDir, SyncEngine) {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("acadex.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let engine = SyncEngine::new(
        Arc::new(drive),
        TextExtractor::new(vision, 50),
        VectorIndex::new(pool.clone(), Arc::new(MockEmbedder)),
        Manifest::new(pool),
        branches
            .iter()
            .map(|(b, f)| (b.to_string(), f.to_string()))
            .collect(),
        ChunkingConfig::default(),
    );

    (dir, engine)
}

const NOTE_TEXT: &[u8] = b"Operating systems: processes, scheduling, and memory management basics.";

/// One branch, one year folder, one Notes subfolder with two text files.
fn small_tree() -> MockDrive {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y1", "1st Year");
    drive.folder("y1", "notes", "Lecture Notes");
    drive.file("notes", "f-os", "os.txt", "text/plain", NOTE_TEXT);
    drive.file(
        "notes",
        "f-dbms",
        "dbms.txt",
        "text/plain",
        b"Database systems: relational model, SQL joins, and normalization forms.",
    );
    drive
}

// ============ Tests ============

#[tokio::test]
async fn sync_ingests_and_reports_per_branch() {
    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(small_tree(), vision, &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.branches["CSE"].files, 2);
    assert!(report.total_chunks >= 2);
    assert_eq!(report.branches["CSE"].failed, 0);
    assert_eq!(engine.manifest().len().await.unwrap(), 2);
    assert_eq!(engine.index().count().await.unwrap() as u64, report.total_chunks);
}

#[tokio::test]
async fn second_sync_over_unchanged_corpus_embeds_nothing() {
    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(small_tree(), vision, &[("CSE", "root-cse")]).await;

    let first = engine.sync().await;
    assert!(first.total_chunks > 0);

    let second = engine.sync().await;
    assert_eq!(second.status, SyncStatus::Complete);
    assert_eq!(second.total_chunks, 0);
    assert_eq!(second.branches["CSE"].files, 0);
    assert_eq!(second.branches["CSE"].skipped, 2);
}

#[tokio::test]
async fn one_bad_download_does_not_sink_the_branch() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y2", "Year 2");
    drive.folder("y2", "papers", "Question Papers");
    for i in 0..10 {
        drive.file(
            "papers",
            &format!("f-{}", i),
            &format!("paper-{}.txt", i),
            "text/plain",
            format!("Question paper number {} with enough text to chunk properly.", i).as_bytes(),
        );
    }
    drive.fail_downloads.insert("f-3".to_string());

    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(drive, vision, &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.branches["CSE"].files, 9);
    assert_eq!(report.branches["CSE"].failed, 1);
    assert_eq!(engine.manifest().len().await.unwrap(), 9);

    // The failed file stays unmarked and is the only one retried.
    let retry = engine.sync().await;
    assert_eq!(retry.branches["CSE"].skipped, 9);
    assert_eq!(retry.branches["CSE"].failed, 1);
}

#[tokio::test]
async fn unclassifiable_year_folders_are_skipped() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "sem9", "Semester 9");
    drive.file("sem9", "f-x", "notes.txt", "text/plain", NOTE_TEXT);
    drive.folder("root-cse", "archive", "Archive");
    drive.file("archive", "f-y", "old.txt", "text/plain", NOTE_TEXT);
    drive.folder("root-cse", "y1", "1st Year");
    drive.file("y1", "f-ok", "intro.txt", "text/plain", NOTE_TEXT);

    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(drive, vision, &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.branches["CSE"].files, 1);
    assert!(!engine.manifest().contains("f-x").await.unwrap());
    assert!(!engine.manifest().contains("f-y").await.unwrap());
    assert!(engine.manifest().contains("f-ok").await.unwrap());
}

#[tokio::test]
async fn unreadable_branch_root_skips_branch_not_run() {
    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(
        small_tree(),
        vision,
        &[("CSE", "root-cse"), ("ECE", "root-missing")],
    )
    .await;

    let report = engine.sync().await;
    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.branches["CSE"].files, 2);
    assert_eq!(report.branches["ECE"].files, 0);
}

#[tokio::test]
async fn no_configured_branches_means_skipped_report() {
    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(MockDrive::default(), vision, &[("CSE", "  ")]).await;

    let report = engine.sync().await;
    assert_eq!(report.status, SyncStatus::Skipped);
    assert_eq!(report.total_chunks, 0);
}

#[tokio::test]
async fn queries_never_cross_the_branch_year_partition() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "cse-y2", "Year 2");
    drive.file("cse-y2", "f-cse2", "cse-networks.txt", "text/plain",
        b"Computer networks: TCP handshakes, routing tables, congestion control.");
    drive.folder("root-cse", "cse-y3", "Year 3");
    drive.file("cse-y3", "f-cse3", "cse-compilers.txt", "text/plain",
        b"Compilers: lexing, parsing, intermediate representations, codegen.");
    drive.folder("root-ece", "ece-y2", "Year 2");
    drive.file("ece-y2", "f-ece2", "ece-signals.txt", "text/plain",
        b"Signals and systems: Fourier transforms, sampling, and filters.");

    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(
        drive,
        vision,
        &[("CSE", "root-cse"), ("ECE", "root-ece")],
    )
    .await;
    engine.sync().await;

    let hits = engine.index().query("networks", "CSE", 2, 10).await;
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.filename, "cse-networks.txt");
    }

    // Lowercase branch codes hit the same partition.
    let hits_lower = engine.index().query("networks", "cse", 2, 10).await;
    assert_eq!(hits.len(), hits_lower.len());

    let empty = engine.index().query("networks", "CSE", 4, 10).await;
    assert!(empty.is_empty());
}

#[tokio::test]
async fn direct_files_default_to_notes_and_subfolders_classify() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y1", "1st Year");
    drive.file("y1", "f-direct", "handout.txt", "text/plain", NOTE_TEXT);
    drive.folder("y1", "syl", "Syllabus 2024");
    drive.file("syl", "f-syl", "syllabus.txt", "text/plain",
        b"Semester one syllabus: mathematics, physics, and programming in C.");

    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(drive, vision, &[("CSE", "root-cse")]).await;
    engine.sync().await;

    let hits = engine.index().query("anything", "CSE", 1, 10).await;
    let categories: HashSet<(String, String)> = hits
        .into_iter()
        .map(|h| (h.filename, h.category))
        .collect();
    assert!(categories.contains(&("handout.txt".to_string(), "notes".to_string())));
    assert!(categories.contains(&("syllabus.txt".to_string(), "syllabus".to_string())));
}

#[tokio::test]
async fn unparseable_pdf_is_rescued_by_vision() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y1", "1st Year");
    drive.folder("y1", "tt", "Timetable");
    drive.file("tt", "f-scan", "timetable.pdf", "application/pdf", b"scanned image payload");

    let vision = Arc::new(StubVision::new(
        "Monday | 9am | Physics\nMonday | 10am | Mathematics\nTuesday | 9am | Chemistry lab",
    ));
    let (_dir, engine) = build_engine(drive, vision.clone(), &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.branches["CSE"].files, 1);
    assert_eq!(vision.call_count(), 1);

    let hits = engine.index().query("physics timetable", "CSE", 1, 5).await;
    assert!(hits.iter().any(|h| h.content.contains("Physics")));
    assert!(hits.iter().all(|h| h.category == "timetable"));
}

#[tokio::test]
async fn google_native_docs_are_exported_and_ingested() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y1", "Year 1");
    // Export produces (mock) PDF bytes that fail direct parsing, so the
    // vision path carries the file.
    drive.file(
        "y1",
        "f-gdoc",
        "Shared notes",
        "application/vnd.google-apps.document",
        b"gdoc export payload",
    );

    let vision = Arc::new(StubVision::new(
        "Unit outline: electromagnetism, circuits, and lab safety instructions.",
    ));
    let (_dir, engine) = build_engine(drive, vision.clone(), &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.branches["CSE"].files, 1);
    assert_eq!(vision.call_count(), 1);
}

#[tokio::test]
async fn empty_extraction_skips_without_error() {
    let mut drive = MockDrive::default();
    drive.folder("root-cse", "y1", "Year 1");
    drive.file("y1", "f-empty", "blank.txt", "text/plain", b"   ");

    let vision = Arc::new(StubVision::new(""));
    let (_dir, engine) = build_engine(drive, vision, &[("CSE", "root-cse")]).await;

    let report = engine.sync().await;
    assert_eq!(report.status, SyncStatus::Complete);
    assert_eq!(report.branches["CSE"].files, 0);
    assert_eq!(report.branches["CSE"].skipped, 1);
    // Not marked: a later upload of real content under the same id ingests.
    assert!(!engine.manifest().contains("f-empty").await.unwrap());
}

#[tokio::test]
async fn upsert_with_same_ids_overwrites_in_place() {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("acadex.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let index = VectorIndex::new(pool, Arc::new(MockEmbedder));

    let record = |text: &str| ChunkRecord {
        id: "CSE_1_f-1_0".to_string(),
        text: text.to_string(),
        meta: RecordMeta {
            branch: "CSE".to_string(),
            year: 1,
            category: acadex::models::Category::Notes,
            filename: "n.txt".to_string(),
            link: None,
        },
    };

    index.upsert(&[record("first version of the text")]).await.unwrap();
    index.upsert(&[record("second version of the text")]).await.unwrap();

    assert_eq!(index.count().await.unwrap(), 1);
    let hits = index.query("text", "CSE", 1, 5).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "second version of the text");
}

#[tokio::test]
async fn query_against_unmigrated_database_degrades_to_empty() {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("fresh.sqlite")).await.unwrap();
    // No migrations: the chunk_records table does not exist.
    let index = VectorIndex::new(pool, Arc::new(MockEmbedder));

    let hits = index.query("anything", "CSE", 2, 5).await;
    assert!(hits.is_empty());
}
