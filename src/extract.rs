//! Text extraction for uploaded documents (PDF, DOCX).
//!
//! The document kind is chosen from the reference's extension. Parsing runs
//! on the blocking thread pool; a panic inside the PDF parser is reported as
//! an [`ExtractError::Pdf`] rather than taking the worker down.
//!
//! Whether an extraction failure fails the task is decided by
//! [`ContentExtractor`]: in the default permissive mode unsupported or
//! unreadable documents degrade to empty text with a warning.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::storage::DocumentStorage;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY_ENTRY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Closed set of accepted document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Lower-cased extensions accepted on upload.
    pub const EXTENSIONS: [&'static str; 2] = ["pdf", "docx"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }

    /// Kind of the document at `reference`, judged by its extension.
    pub fn from_reference(reference: &str) -> Result<Self, ExtractError> {
        Path::new(reference)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| ExtractError::UnsupportedFormat(reference.to_string()))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
        }
    }
}

/// Extracts plain text from document bytes.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY_ENTRY)
        .map_err(|_| ExtractError::Docx(format!("{} not found", DOCX_BODY_ENTRY)))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY_ENTRY, MAX_XML_ENTRY_BYTES
        )));
    }

    extract_w_t_elements(&doc_xml)
}

/// Collects every `w:t` text leaf in document order, space separated.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut runs: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"t" => {
                in_text = false;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                runs.push(text.into_owned());
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(runs.join(" ").trim().to_string())
}

/// Error for a parse that did not return, attributed to the parser of `kind`.
fn parser_panicked(kind: DocumentKind, err: &dyn std::fmt::Display) -> ExtractError {
    let message = format!("parser panicked: {}", err);
    match kind {
        DocumentKind::Pdf => ExtractError::Pdf(message),
        DocumentKind::Docx => ExtractError::Docx(message),
    }
}

/// Loads a stored document and extracts its text under the configured
/// failure policy.
#[derive(Clone)]
pub struct ContentExtractor {
    storage: Arc<dyn DocumentStorage>,
    strict: bool,
}

impl ContentExtractor {
    pub fn new(storage: Arc<dyn DocumentStorage>, strict: bool) -> Self {
        Self { storage, strict }
    }

    /// Text of the document at `document_ref`.
    ///
    /// A missing or unreadable blob is always an error. Format and parse
    /// failures are errors only in strict mode; otherwise they yield `""`.
    pub async fn extract(&self, document_ref: &str) -> Result<String, AnalysisError> {
        let kind = match DocumentKind::from_reference(document_ref) {
            Ok(kind) => kind,
            Err(e) => return self.degrade(document_ref, e),
        };

        let bytes = self.storage.get(document_ref).await?;

        let parsed = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
            .await
            .unwrap_or_else(|join_err| Err(parser_panicked(kind, &join_err)));

        match parsed {
            Ok(text) => {
                debug!(document = %document_ref, chars = text.len(), "extracted document text");
                Ok(text)
            }
            Err(e) => self.degrade(document_ref, e),
        }
    }

    fn degrade(&self, document_ref: &str, err: ExtractError) -> Result<String, AnalysisError> {
        if self.strict {
            return Err(err.into());
        }
        warn!(document = %document_ref, error = %err, "extraction failed; continuing with empty text");
        Ok(String::new())
    }
}
