//! Multi-format text extraction with a vision fallback.
//!
//! Each [`DocFormat`](crate::models::DocFormat) variant maps to one
//! extraction routine returning plain UTF-8 text. Tabular content keeps its
//! row/column shape: cells are joined with `" | "`, slides and sheets are
//! introduced by boundary markers, so a timetable stays recognizable as one
//! after chunking.
//!
//! The public entry point never fails: parser errors are logged and the
//! best available string (possibly empty) is returned. Empty output is the
//! caller's signal to skip the file.

use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

use crate::models::DocFormat;
use crate::vision::VisionModel;

/// Separator between table/spreadsheet cells in extracted text.
const CELL_SEPARATOR: &str = " | ";

/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum sheets to process in a spreadsheet.
const XLSX_MAX_SHEETS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Format-dispatching extractor. Holds the vision capability used directly
/// for images and legacy binary formats, and as the scanned-document
/// fallback for PDFs.
pub struct TextExtractor {
    vision: Arc<dyn VisionModel>,
    ocr_min_chars: usize,
}

impl TextExtractor {
    pub fn new(vision: Arc<dyn VisionModel>, ocr_min_chars: usize) -> Self {
        Self {
            vision,
            ocr_min_chars,
        }
    }

    /// Extract text from `bytes` according to `format`. `mime` is the
    /// source mime type, forwarded to the vision model where needed.
    ///
    /// Never errors: parse failures are logged and yield the best
    /// available string. An empty result means "nothing to ingest".
    pub async fn extract(&self, format: DocFormat, mime: &str, bytes: &[u8]) -> String {
        let result = match format {
            DocFormat::Pdf => {
                let fallback = ScanFallback {
                    vision: self.vision.as_ref(),
                    min_chars: self.ocr_min_chars,
                };
                return fallback.extract(bytes).await;
            }
            DocFormat::WordDoc => word_doc_text(bytes),
            DocFormat::Spreadsheet => spreadsheet_text(bytes),
            DocFormat::SlideDeck => slide_deck_text(bytes),
            DocFormat::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
            DocFormat::Image | DocFormat::LegacyOffice => {
                return self.transcribe(mime, bytes).await;
            }
        };

        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "extraction failed, skipping content");
                String::new()
            }
        }
    }

    async fn transcribe(&self, mime: &str, bytes: &[u8]) -> String {
        match self.vision.transcribe(mime, bytes).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "vision transcription failed");
                String::new()
            }
        }
    }
}

/// Scanned-document fallback wrapped around direct PDF extraction.
///
/// Direct extraction of an image-only PDF yields next to nothing; when the
/// result falls below `min_chars` non-whitespace characters the document is
/// re-read through the vision model instead.
struct ScanFallback<'a> {
    vision: &'a dyn VisionModel,
    min_chars: usize,
}

impl ScanFallback<'_> {
    async fn extract(&self, bytes: &[u8]) -> String {
        let direct = match pdf_text(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "direct PDF extraction failed, trying vision");
                String::new()
            }
        };

        if !below_scan_threshold(&direct, self.min_chars) {
            return direct;
        }

        tracing::debug!("PDF looks scanned, routing to vision transcription");
        match self.vision.transcribe("application/pdf", bytes).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "vision transcription failed");
                direct
            }
        }
    }
}

/// Whether extracted text is too thin to trust (scanned/image-only source).
fn below_scan_threshold(text: &str, min_chars: usize) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() < min_chars
}

fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

// ============ OOXML ============

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Body paragraphs and tables of one WordprocessingML or DrawingML part.
///
/// Both vocabularies use the same local names for the structure we need
/// (`p` paragraphs, `t` text runs, `tbl`/`tr`/`tc` tables), so one walker
/// serves .docx documents and .pptx slides alike. Only top-level tables are
/// given structure; nested table text flows into the enclosing cell.
fn paragraphs_and_tables(
    xml: &[u8],
) -> Result<(Vec<String>, Vec<Vec<Vec<String>>>), ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut tables: Vec<Vec<Vec<String>>> = Vec::new();

    let mut in_text_run = false;
    let mut table_depth = 0usize;
    let mut para_buf = String::new();
    let mut cell_buf = String::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut table_rows: Vec<Vec<String>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = true,
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table_rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row_cells.clear(),
                b"tc" if table_depth == 1 => cell_buf.clear(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_text_run => {
                let text = t.unescape().unwrap_or_default();
                if table_depth > 0 {
                    cell_buf.push_str(&text);
                } else {
                    para_buf.push_str(&text);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if table_depth == 0 {
                        let text = para_buf.trim();
                        if !text.is_empty() {
                            paragraphs.push(text.to_string());
                        }
                        para_buf.clear();
                    } else if !cell_buf.is_empty() && !cell_buf.ends_with(' ') {
                        // Paragraph boundary inside a cell becomes a space.
                        cell_buf.push(' ');
                    }
                }
                b"tbl" => {
                    if table_depth == 1 {
                        tables.push(std::mem::take(&mut table_rows));
                    }
                    table_depth = table_depth.saturating_sub(1);
                }
                b"tr" if table_depth == 1 => {
                    table_rows.push(std::mem::take(&mut row_cells));
                }
                b"tc" if table_depth == 1 => {
                    row_cells.push(cell_buf.trim().to_string());
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok((paragraphs, tables))
}

fn table_to_text(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|cells| cells.join(CELL_SEPARATOR))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Word document: non-empty paragraphs first, then each table's rows.
fn word_doc_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let (paragraphs, tables) = paragraphs_and_tables(&doc_xml)?;

    let mut parts = paragraphs;
    for table in &tables {
        parts.push(table_to_text(table));
    }
    Ok(parts.join("\n"))
}

/// Slide deck: per slide in numeric order, a boundary marker, then the
/// slide's text-frame paragraphs, then its tables.
fn slide_deck_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut slides = Vec::new();
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        let (paragraphs, tables) = paragraphs_and_tables(&xml)?;

        let mut lines = vec![format!("--- Slide {} ---", idx + 1)];
        lines.extend(paragraphs);
        for table in &tables {
            for row in table {
                lines.push(row.join(CELL_SEPARATOR));
            }
        }
        slides.push(lines.join("\n"));
    }
    Ok(slides.join("\n\n"))
}

/// Spreadsheet: per sheet, a boundary marker, then each row that has at
/// least one non-empty cell, cells joined with the separator.
fn spreadsheet_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let display_names = read_sheet_display_names(&mut archive)?;

    let mut sheet_files: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    sheet_files.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut sheets = Vec::new();
    for (idx, file) in sheet_files.iter().take(XLSX_MAX_SHEETS).enumerate() {
        let label = display_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        let xml = read_zip_entry_bounded(&mut archive, file)?;
        let rows = sheet_rows(&xml, &shared_strings)?;

        let mut lines = vec![format!("--- Sheet: {} ---", label)];
        lines.extend(rows);
        sheets.push(lines.join("\n"));
    }
    Ok(sheets.join("\n\n"))
}

/// Sheet names in workbook order, from `xl/workbook.xml`.
fn read_sheet_display_names(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = match read_zip_entry_bounded(archive, "xl/workbook.xml") {
        Ok(xml) => xml,
        // Workbook metadata is optional for our purposes.
        Err(_) => return Ok(Vec::new()),
    };

    let mut names = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            names.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = match read_zip_entry_bounded(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        // Sheets with only numeric cells ship no shared-string part.
        Err(_) => return Ok(Vec::new()),
    };

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_si => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Rows of one worksheet, rendered as separator-joined lines. Rows whose
/// cells are all empty are omitted.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut lines = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_value = false;
    let mut cell_is_shared = false;
    let mut cell_has_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                    cell_has_value = false;
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) if in_value => {
                let raw = t.unescape().unwrap_or_default();
                let value = if cell_is_shared {
                    raw.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default()
                } else {
                    raw.into_owned()
                };
                row.push(value);
                cell_has_value = true;
            }
            // Self-closing cells carry no value but keep their column slot.
            Ok(quick_xml::events::Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                row.push(String::new());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"c" => {
                    if !cell_has_value {
                        row.push(String::new());
                    }
                    cell_is_shared = false;
                }
                b"row" => {
                    if row.iter().any(|c| !c.trim().is_empty()) {
                        lines.push(row.join(CELL_SEPARATOR));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(lines)
}
