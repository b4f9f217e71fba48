//! Sync orchestration.
//!
//! Drives the full ingestion flow per configured branch: crawl → fetch →
//! extract → chunk → upsert → manifest mark, accumulating per-branch
//! statistics. Faults are isolated at their origin — a bad file fails that
//! file, a bad folder skips that folder, a bad branch skips that branch —
//! and [`SyncEngine::sync`] always returns a well-formed report.
//!
//! Files run strictly sequentially within a run, and the periodic
//! scheduler starts a new run only after the previous one finished, so at
//! most one sync is ever in flight. Blocking embedding work happens on the
//! runtime's blocking pool, keeping concurrent queries responsive.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chunk::{chunk_id, chunk_text};
use crate::config::ChunkingConfig;
use crate::drive::RemoteDrive;
use crate::error::Result;
use crate::extract::TextExtractor;
use crate::fetch::fetch_file;
use crate::index::VectorIndex;
use crate::manifest::{content_hash, Manifest};
use crate::crawler;
use crate::models::{
    BranchStats, ChunkRecord, DiscoveredFile, FileOutcome, RecordMeta, SyncReport, SyncStatus,
};

pub struct SyncEngine {
    remote: Arc<dyn RemoteDrive>,
    extractor: TextExtractor,
    index: VectorIndex,
    manifest: Manifest,
    /// Branch code → root folder id. Branches with empty ids are skipped.
    branches: BTreeMap<String, String>,
    chunking: ChunkingConfig,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteDrive>,
        extractor: TextExtractor,
        index: VectorIndex,
        manifest: Manifest,
        branches: BTreeMap<String, String>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            remote,
            extractor,
            index,
            manifest,
            branches,
            chunking,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Run one full sync pass over every configured branch.
    pub async fn sync(&self) -> SyncReport {
        let configured: Vec<(&String, &String)> = self
            .branches
            .iter()
            .filter(|(_, folder_id)| !folder_id.trim().is_empty())
            .collect();

        if configured.is_empty() {
            tracing::warn!("no branch root folders configured, nothing to sync");
            return SyncReport::skipped();
        }

        let mut report = SyncReport {
            status: SyncStatus::Complete,
            total_chunks: 0,
            branches: BTreeMap::new(),
        };

        for (branch, folder_id) in configured {
            tracing::info!(branch = %branch, "syncing branch");
            let stats = self.sync_branch(branch, folder_id).await;
            report.total_chunks += stats.chunks;
            report.branches.insert(branch.clone(), stats);
        }

        tracing::info!(total_chunks = report.total_chunks, "sync complete");
        report
    }

    async fn sync_branch(&self, branch: &str, folder_id: &str) -> BranchStats {
        let mut stats = BranchStats::default();

        let discovered = match crawler::crawl_branch(self.remote.as_ref(), branch, folder_id).await
        {
            Ok(discovered) => discovered,
            Err(e) => {
                tracing::warn!(branch, error = %e, "branch root unreachable, skipping branch");
                return stats;
            }
        };

        for file in &discovered {
            match self.process_file(file).await {
                Ok(FileOutcome::Ingested { chunks }) => {
                    tracing::info!(file = %file.entry.name, chunks, "ingested");
                    stats.files += 1;
                    stats.chunks += chunks as u64;
                }
                Ok(FileOutcome::AlreadyIngested) => {
                    tracing::debug!(file = %file.entry.name, "already ingested, skipping");
                    stats.skipped += 1;
                }
                Ok(FileOutcome::NoText) => {
                    tracing::warn!(file = %file.entry.name, "no text extracted, skipping");
                    stats.skipped += 1;
                }
                Err(e) => {
                    // The file stays unmarked and is retried next run.
                    tracing::warn!(file = %file.entry.name, error = %e, "file failed");
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// Run one file through fetch → extract → chunk → upsert → mark.
    ///
    /// The fetched bytes live in a scoped temp file that is deleted when
    /// this function returns, whatever the outcome.
    async fn process_file(&self, file: &DiscoveredFile) -> Result<FileOutcome> {
        if self.manifest.contains(&file.entry.id).await? {
            return Ok(FileOutcome::AlreadyIngested);
        }

        let fetched = fetch_file(self.remote.as_ref(), &file.entry).await?;
        let bytes = fetched.read_bytes().await?;

        let text = self
            .extractor
            .extract(fetched.format(), fetched.mime(), &bytes)
            .await;
        if text.trim().is_empty() {
            return Ok(FileOutcome::NoText);
        }

        let chunks = chunk_text(&text, self.chunking.window, self.chunking.overlap);
        if chunks.is_empty() {
            return Ok(FileOutcome::NoText);
        }

        let file_ref = if file.entry.id.is_empty() {
            &file.entry.name
        } else {
            &file.entry.id
        };

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                id: chunk_id(&file.branch, file.year, file_ref, i),
                text,
                meta: RecordMeta {
                    branch: file.branch.to_uppercase(),
                    year: file.year,
                    category: file.category,
                    filename: file.entry.name.clone(),
                    link: file.entry.web_view_link.clone(),
                },
            })
            .collect();

        self.index.upsert(&records).await?;
        self.manifest
            .mark(&file.entry.id, Some(&content_hash(&bytes)))
            .await?;

        Ok(FileOutcome::Ingested {
            chunks: records.len(),
        })
    }

    /// Start the perpetual scheduler: sync, sleep `interval`, repeat.
    ///
    /// Runs as a single task, so syncs never overlap. The stop signal is
    /// honored between iterations; an in-flight run completes first.
    pub fn start_periodic(self: Arc<Self>, interval: Duration) -> PeriodicSync {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                tracing::info!("starting scheduled sync");
                let report = self.sync().await;
                tracing::info!(
                    total_chunks = report.total_chunks,
                    interval_secs = interval.as_secs(),
                    "scheduled sync finished, sleeping"
                );

                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        PeriodicSync { stop_tx, handle }
    }
}

/// Handle to a running periodic sync task.
pub struct PeriodicSync {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicSync {
    /// Signal the scheduler to stop and wait for it to wind down. If a
    /// sync is mid-run, it finishes before the task exits.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Print a sync report the way the CLI presents it.
pub fn print_report(report: &SyncReport) {
    match report.status {
        SyncStatus::Skipped => {
            println!("sync skipped (no branch folders configured)");
            return;
        }
        SyncStatus::Complete => println!("sync complete"),
    }
    for (branch, stats) in &report.branches {
        println!(
            "  {}: {} files, {} chunks, {} skipped, {} failed",
            branch, stats.files, stats.chunks, stats.skipped, stats.failed
        );
    }
    println!("  total chunks: {}", report.total_chunks);
}
