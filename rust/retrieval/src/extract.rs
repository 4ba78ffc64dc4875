//! Text extraction from uploaded manual documents.
//!
//! The corpus store only depends on the [`TextExtractor`] trait. The
//! bundled [`DefaultExtractor`] handles plain text (UTF-8 with a Latin-1
//! fallback) and DOCX (paragraph text from the document part). PDF and
//! audio transcription are provided by external implementations of the
//! same trait.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{RetrievalError, RetrievalResult};

/// Extracts plain text from a document on disk.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the full text of the document at `path`.
    async fn extract(&self, path: &Path) -> RetrievalResult<String>;
}

/// The extractor used when no custom one is injected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

#[async_trait]
impl TextExtractor for DefaultExtractor {
    async fn extract(&self, path: &Path) -> RetrievalResult<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match extension.as_str() {
            "txt" => extract_txt(path),
            "docx" => extract_docx(path),
            other => Err(RetrievalError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }
}

/// Read a text file as UTF-8, falling back to Latin-1 when the bytes are
/// not valid UTF-8.
fn extract_txt(path: &Path) -> RetrievalResult<String> {
    let bytes = std::fs::read(path).map_err(|err| RetrievalError::ExtractFailed {
        doc_source: source_name(path),
        message: err.to_string(),
    })?;

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => Ok(err.as_bytes().iter().map(|&b| b as char).collect()),
    }
}

/// Extract paragraph text from a DOCX archive.
///
/// Reads `word/document.xml` and joins the text runs of each `w:p`
/// paragraph with newlines, skipping empty paragraphs.
fn extract_docx(path: &Path) -> RetrievalResult<String> {
    let fail = |message: String| RetrievalError::ExtractFailed {
        doc_source: source_name(path),
        message,
    };

    let file = std::fs::File::open(path).map_err(|err| fail(err.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| fail(err.to_string()))?;
    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|err| fail(err.to_string()))?;
    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|err| fail(err.to_string()))?;

    let mut reader = Reader::from_str(&xml);
    let mut in_text_run = false;
    let mut paragraph = String::new();
    let mut paragraphs: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_text_run = false,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !paragraph.trim().is_empty() {
                    paragraphs.push(std::mem::take(&mut paragraph));
                } else {
                    paragraph.clear();
                }
            }
            Ok(Event::Text(t)) if in_text_run => {
                let text = t.unescape().map_err(|err| fail(err.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(fail(err.to_string())),
            Ok(_) => {}
        }
    }

    Ok(paragraphs.join("\n"))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}
