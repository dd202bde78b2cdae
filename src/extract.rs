//! Text extraction for uploaded legal documents (PDF, DOCX).
//!
//! This is the document-store side of the pipeline: callers supply bytes and
//! a [`SourceFormat`], this module returns plain UTF-8 text wrapped in a
//! [`Document`]. Extraction never panics; a failure is an [`ExtractError`],
//! which the pipeline absorbs by answering in general-information mode.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

use crate::models::{Document, SourceFormat};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("{format} extraction failed: {message}")]
    Extraction {
        format: SourceFormat,
        message: String,
    },
    #[error("document is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    fn pdf(message: impl ToString) -> Self {
        ExtractError::Extraction {
            format: SourceFormat::Pdf,
            message: message.to_string(),
        }
    }

    fn docx(message: impl ToString) -> Self {
        ExtractError::Extraction {
            format: SourceFormat::Docx,
            message: message.to_string(),
        }
    }
}

impl SourceFormat {
    /// Detects the format from a file extension (`.pdf`, `.docx`).
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(SourceFormat::Pdf),
            "docx" => Ok(SourceFormat::Docx),
            "" => Err(ExtractError::UnsupportedFormat(
                "file has no extension".to_string(),
            )),
            other => Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    /// Detects the format from a MIME type, ignoring parameters.
    pub fn from_content_type(content_type: &str) -> Result<Self, ExtractError> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            MIME_PDF => Ok(SourceFormat::Pdf),
            MIME_DOCX => Ok(SourceFormat::Docx),
            _ => Err(ExtractError::UnsupportedFormat(content_type.to_string())),
        }
    }
}

/// Extracts plain text from document bytes.
pub fn extract_text(bytes: &[u8], format: SourceFormat) -> Result<String, ExtractError> {
    match format {
        SourceFormat::Pdf => extract_pdf(bytes),
        SourceFormat::Docx => extract_docx(bytes),
    }
}

/// Extracts a [`Document`] from uploaded bytes.
pub fn extract_document(
    bytes: &[u8],
    format: SourceFormat,
    filename: Option<&str>,
) -> Result<Document, ExtractError> {
    let raw_text = extract_text(bytes, format)?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        filename: filename.map(|f| f.to_string()),
        format,
        raw_text,
        content_hash,
        extracted_at: Utc::now(),
    })
}

/// Reads and extracts a document from disk, refusing files over `max_bytes`.
pub fn read_document(path: &Path, max_bytes: u64) -> Result<Document, ExtractError> {
    let format = SourceFormat::from_path(path)?;
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(ExtractError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    let filename = path.file_name().and_then(|n| n.to_str());
    extract_document(&bytes, format, filename)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::pdf(e)),
        Err(_) => Err(ExtractError::pdf("parser panicked on malformed input")),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ExtractError::docx)?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::docx("word/document.xml not found"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(ExtractError::docx)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::docx("word/document.xml exceeds size limit"));
    }
    extract_paragraphs(&doc_xml)
}

/// Collects `<w:t>` runs, one paragraph (`<w:p>`) per blank-line separated block.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push(' '),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(ExtractError::docx)?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = std::mem::take(&mut current);
                    if !para.trim().is_empty() {
                        paragraphs.push(para);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::docx(e)),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n\n"))
}
