//! File → text extraction.
//!
//! Extraction never fails from the caller's point of view: unreadable,
//! corrupt or unsupported files yield an empty string.
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use calamine::Reader;
use tracing::debug;

/// Turns a file into indexable text.
///
/// Implementations run on worker threads, possibly many at once, and must
/// not share mutable state between calls.
pub trait ContentExtractor: Send + Sync {
    /// Extract text from `path`. Returns an empty string on any failure.
    fn extract(&self, path: &Path) -> String;
}

/// Default extractor: plain text, CSV, spreadsheets, DOCX and PDF.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileContentExtractor;

const TEXT_EXTS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "ini", "cfg", "conf", "json", "xml", "yaml", "yml",
    "toml", "html", "htm",
];

const SHEET_EXTS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

impl FileContentExtractor {
    fn try_extract(&self, path: &Path) -> Result<String> {
        let Some(ext) = extension(path) else {
            return Ok(String::new());
        };

        match ext.as_str() {
            e if TEXT_EXTS.contains(&e) => read_text(path),
            "csv" => read_csv(path),
            e if SHEET_EXTS.contains(&e) => read_spreadsheet(path),
            "docx" => read_docx(path),
            "pdf" => read_pdf(path),
            _ => Ok(String::new()),
        }
    }
}

impl ContentExtractor for FileContentExtractor {
    fn extract(&self, path: &Path) -> String {
        match self.try_extract(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("Extraction failed for {}: {e:#}", path.display());
                String::new()
            }
        }
    }
}

/// UTF-8 first, Latin-1 when the bytes are not valid UTF-8.
fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    })
}

fn read_csv(path: &Path) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut out = String::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<&str> = record.iter().collect();
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    Ok(out)
}

fn read_spreadsheet(path: &Path) -> Result<String> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();

    let mut out = String::new();
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        writeln!(out, "--- {name} ---")?;
        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(out, "{}", cells.join("\t"))?;
        }
    }
    Ok(out)
}

fn read_docx(path: &Path) -> Result<String> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let bytes = fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| anyhow!("invalid docx: {e:?}"))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        let mut text = String::new();
        for p_child in &paragraph.children {
            if let ParagraphChild::Run(run) = p_child {
                for r_child in &run.children {
                    if let RunChild::Text(t) = r_child {
                        text.push_str(&t.text);
                    }
                }
            }
        }
        paragraphs.push(text);
    }
    Ok(paragraphs.join("\n"))
}

fn read_pdf(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    Ok(doc.extract_text(&pages)?)
}
