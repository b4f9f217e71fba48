//! File materialization.
//!
//! Turns a discovered remote file into local bytes on disk. Native formats
//! are downloaded as-is; Google-native documents, sheets, and slides are
//! exported to PDF because Drive cannot serve their internal
//! representation.
//!
//! The result lives in a [`tempfile::NamedTempFile`], so the bytes are
//! removed when the [`FetchedFile`] is dropped — on every exit path,
//! including extraction failures further down the pipeline.

use std::io::Write;
use std::path::Path;

use crate::drive::RemoteDrive;
use crate::error::{Error, Result};
use crate::models::{DocFormat, RemoteEntry};

/// Mime type Google-native documents are exported to.
const EXPORT_MIME: &str = "application/pdf";

/// A fetched document: scoped temp bytes plus the format they should be
/// extracted as.
pub struct FetchedFile {
    temp: tempfile::NamedTempFile,
    format: DocFormat,
    /// Mime type of the bytes on disk (the export mime for exported files).
    mime: String,
}

impl FetchedFile {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn format(&self) -> DocFormat {
        self.format
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.temp.path()).await?)
    }
}

/// Retrieve one remote file into a scoped temporary file.
pub async fn fetch_file(remote: &dyn RemoteDrive, entry: &RemoteEntry) -> Result<FetchedFile> {
    let (bytes, format, mime) = if DocFormat::needs_export(&entry.mime_type) {
        let bytes = remote.export(&entry.id, EXPORT_MIME).await?;
        (bytes, DocFormat::Pdf, EXPORT_MIME.to_string())
    } else {
        let format = DocFormat::from_mime(&entry.mime_type).ok_or_else(|| {
            Error::fetch(&entry.name, format!("unsupported mime type: {}", entry.mime_type))
        })?;
        let bytes = remote.download(&entry.id).await?;
        (bytes, format, entry.mime_type.clone())
    };

    let mut temp = tempfile::NamedTempFile::new()
        .map_err(|e| Error::fetch(&entry.name, format!("creating temp file: {}", e)))?;
    temp.write_all(&bytes)
        .map_err(|e| Error::fetch(&entry.name, format!("writing temp file: {}", e)))?;
    temp.flush()
        .map_err(|e| Error::fetch(&entry.name, format!("flushing temp file: {}", e)))?;

    Ok(FetchedFile {
        temp,
        format,
        mime,
    })
}
