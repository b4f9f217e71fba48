use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding the SQLite index database.
    pub dir: PathBuf,
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("acadex.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    /// Path to the service-account JSON key. Teachers share their folders
    /// with this account's email; the key grants read-only access.
    #[serde(default = "default_service_account")]
    pub service_account_json: PathBuf,
    /// Branch code (e.g. `CSE`) to root folder id. A branch with an empty
    /// folder id is skipped at sync time, not rejected at load time.
    #[serde(default)]
    pub branches: BTreeMap<String, String>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            service_account_json: default_service_account(),
            branches: BTreeMap::new(),
        }
    }
}

fn default_service_account() -> PathBuf {
    PathBuf::from("./service-account.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            overlap: default_overlap(),
        }
    }
}

fn default_window() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Minimum non-whitespace characters a PDF extraction must yield before
    /// the document is treated as scanned and re-read through the vision
    /// model.
    #[serde(default = "default_ocr_min_chars")]
    pub ocr_min_chars: usize,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr_min_chars: default_ocr_min_chars(),
            vision_model: default_vision_model(),
        }
    }
}

fn default_ocr_min_chars() -> usize {
    50
}
fn default_vision_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

fn default_interval_minutes() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.window == 0 {
        anyhow::bail!("chunking.window must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window {
        anyhow::bail!("chunking.overlap must be < chunking.window");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.sync.interval_minutes == 0 {
        anyhow::bail!("sync.interval_minutes must be >= 1");
    }

    for branch in config.drive.branches.keys() {
        if branch.trim().is_empty() {
            anyhow::bail!("drive.branches contains an empty branch code");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config("[storage]\ndir = \"./data\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.chunking.window, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.extraction.ocr_min_chars, 50);
        assert_eq!(config.sync.interval_minutes, 30);
        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.drive.branches.is_empty());
    }

    #[test]
    fn branches_table_is_parsed() {
        let f = write_config(
            "[storage]\ndir = \"./data\"\n\n[drive.branches]\nCSE = \"folder-a\"\nECE = \"folder-b\"\n",
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.drive.branches.len(), 2);
        assert_eq!(config.drive.branches["CSE"], "folder-a");
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let f = write_config("[storage]\ndir = \"./d\"\n\n[chunking]\nwindow = 50\noverlap = 50\n");
        assert!(load_config(f.path()).is_err());
    }
}
