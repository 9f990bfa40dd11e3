//! services/podcast/src/adapters/docx.rs
//!
//! Extracts paragraph text from Word (`.docx`) documents.
//!
//! A `.docx` file is a zip archive; the body lives in `word/document.xml` as
//! `w:p` paragraphs made of `w:r` runs whose text sits in `w:t` elements.

use std::io::Read;
use std::path::Path;

use podcast_core::ports::{PortError, PortResult};
use quick_xml::events::Event;
use quick_xml::Reader;

const DOCUMENT_PART: &str = "word/document.xml";

/// Reads the document's non-empty paragraphs, trimmed and joined by newlines.
///
/// Blocking; call it from `spawn_blocking`.
pub fn read_document_text(path: &Path) -> PortResult<String> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PortError::NotFound(path.display().to_string()),
        _ => PortError::Unexpected(format!("Failed to open {}: {}", path.display(), e)),
    })?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PortError::Unsupported(format!("{} is not a Word document: {}", path.display(), e)))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| PortError::Unsupported(format!("{} has no {}: {}", path.display(), DOCUMENT_PART, e)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| PortError::Unexpected(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(paragraphs(&xml)?.join("\n"))
}

/// Collects the text of every `w:p` paragraph in document order, skipping blank ones.
fn paragraphs(xml: &str) -> PortResult<Vec<String>> {
    let bad_xml = |e: quick_xml::Error| PortError::Unexpected(format!("Malformed {}: {}", DOCUMENT_PART, e));

    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(bad_xml)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::Text(text) if in_text => current.push_str(&text.unescape().map_err(bad_xml)?),
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}
