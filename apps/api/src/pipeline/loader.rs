//! Document Loader: turns uploaded resume bytes into page text plus embedded links.
//!
//! PDF is the only format with link extraction: URIs come from link annotations
//! and are appended to the text stream under [`LINKS_MARKER`] so the extraction
//! prompt sees them alongside the rest of the resume. DOCX and TXT yield text only.
//!
//! All parsing runs on the blocking pool. The PDF path spools to a scoped
//! temporary file which is removed when the blocking task finishes, whether the
//! parse succeeded, failed, panicked, or the awaiting request was dropped.

use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use lopdf::{Document, Object};
use quick_xml::events::Event;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const SPOOL_PREFIX: &str = "resume-";

/// Marker line that introduces the trailing links section of a parsed PDF.
pub const LINKS_MARKER: &str = "Links found in document:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        })
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported document format: '{extension}' (expected pdf, docx or txt)")]
    UnsupportedFormat { extension: String },

    #[error("corrupt {format} document: {reason}")]
    CorruptDocument {
        format: DocumentFormat,
        reason: String,
    },
}

fn corrupt(format: DocumentFormat, reason: impl Into<String>) -> LoadError {
    LoadError::CorruptDocument {
        format,
        reason: reason.into(),
    }
}

/// Uploaded resume bytes plus the filename they were declared with.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Bytes,
    pub filename: String,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    /// Text after the last `.` of the filename, or empty when there is none.
    pub fn extension(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or_default()
    }
}

/// Page-ordered text plus the deduplicated hyperlinks found in the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDocument {
    pages: Vec<String>,
    links: Vec<String>,
}

impl ParsedDocument {
    pub fn new(pages: Vec<String>, links: Vec<String>) -> Self {
        let mut unique = Vec::with_capacity(links.len());
        for link in links {
            push_unique(&mut unique, link);
        }
        Self {
            pages,
            links: unique,
        }
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Full text stream: pages joined by newlines, then the links section if any.
    pub fn text(&self) -> String {
        let mut text = self.pages.join("\n");
        if !self.links.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(LINKS_MARKER);
            for link in &self.links {
                text.push('\n');
                text.push_str(link);
            }
        }
        text
    }
}

/// Loads a document, dispatching on the declared extension. PDFs spool to the
/// system temp directory.
pub async fn load(bytes: Bytes, declared_extension: &str) -> Result<ParsedDocument, LoadError> {
    load_spooled_in(bytes, declared_extension, std::env::temp_dir()).await
}

/// Same as [`load`], with PDF spool files created under `spool_dir`.
pub async fn load_spooled_in(
    bytes: Bytes,
    declared_extension: &str,
    spool_dir: PathBuf,
) -> Result<ParsedDocument, LoadError> {
    let format = DocumentFormat::from_extension(declared_extension).ok_or_else(|| {
        LoadError::UnsupportedFormat {
            extension: declared_extension.to_string(),
        }
    })?;

    let parsed = tokio::task::spawn_blocking(move || parse_blocking(format, &bytes, &spool_dir))
        .await
        .map_err(|e| corrupt(format, format!("parser task failed: {e}")))??;

    debug!(
        "Loaded {format} document: {} page(s), {} link(s)",
        parsed.pages().len(),
        parsed.links().len()
    );
    Ok(parsed)
}

fn parse_blocking(
    format: DocumentFormat,
    bytes: &[u8],
    spool_dir: &Path,
) -> Result<ParsedDocument, LoadError> {
    match format {
        DocumentFormat::Pdf => {
            let spool = spool_to_tempfile(bytes, spool_dir)?;
            parse_pdf(spool.path())
        }
        DocumentFormat::Docx => parse_docx(bytes),
        DocumentFormat::Txt => parse_txt(bytes),
    }
}

fn spool_to_tempfile(bytes: &[u8], dir: &Path) -> Result<tempfile::NamedTempFile, LoadError> {
    let mut file = tempfile::Builder::new()
        .prefix(SPOOL_PREFIX)
        .suffix(".pdf")
        .tempfile_in(dir)
        .map_err(|e| corrupt(DocumentFormat::Pdf, format!("failed to create temp file: {e}")))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| corrupt(DocumentFormat::Pdf, format!("failed to spool pdf: {e}")))?;
    Ok(file)
}

fn parse_pdf(path: &Path) -> Result<ParsedDocument, LoadError> {
    let document =
        Document::load(path).map_err(|e| corrupt(DocumentFormat::Pdf, e.to_string()))?;

    // pdf-extract panics on some malformed font programs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        .map_err(|_| corrupt(DocumentFormat::Pdf, "text extractor panicked"))?
        .map_err(|e| corrupt(DocumentFormat::Pdf, e.to_string()))?;

    let pages = pages
        .into_iter()
        .map(|page| page.trim_end().to_string())
        .collect();
    Ok(ParsedDocument::new(pages, collect_pdf_links(&document)))
}

/// URIs from every page's link annotations, first-seen order, no duplicates.
fn collect_pdf_links(document: &Document) -> Vec<String> {
    let mut links = Vec::new();
    for page_id in document.get_pages().into_values() {
        let Ok(page) = document.get_dictionary(page_id) else {
            continue;
        };
        let Ok(annots) = page.get(b"Annots") else {
            continue;
        };
        let Ok((_, annots)) = document.dereference(annots) else {
            continue;
        };
        let Ok(annots) = annots.as_array() else {
            continue;
        };
        for annot in annots {
            if let Some(uri) = annotation_uri(document, annot) {
                push_unique(&mut links, uri);
            }
        }
    }
    links
}

fn annotation_uri(document: &Document, annot: &Object) -> Option<String> {
    let (_, annot) = document.dereference(annot).ok()?;
    let action = annot.as_dict().ok()?.get(b"A").ok()?;
    let (_, action) = document.dereference(action).ok()?;
    let uri = action.as_dict().ok()?.get(b"URI").ok()?;
    let (_, uri) = document.dereference(uri).ok()?;
    let uri = String::from_utf8_lossy(uri.as_str().ok()?).trim().to_string();
    (!uri.is_empty()).then_some(uri)
}

fn push_unique(links: &mut Vec<String>, link: String) {
    if !links.contains(&link) {
        links.push(link);
    }
}

fn parse_docx(bytes: &[u8]) -> Result<ParsedDocument, LoadError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| corrupt(DocumentFormat::Docx, e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| corrupt(DocumentFormat::Docx, format!("word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| corrupt(DocumentFormat::Docx, e.to_string()))?;

    let text = docx_body_text(&xml)?;
    Ok(ParsedDocument::new(vec![text], Vec::new()))
}

/// Collects `w:t` runs; each `w:p` paragraph becomes one line.
fn docx_body_text(xml: &str) -> Result<String, LoadError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run_text => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| corrupt(DocumentFormat::Docx, e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(corrupt(
                    DocumentFormat::Docx,
                    format!("malformed document.xml at byte {}: {e}", reader.buffer_position()),
                ))
            }
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

fn parse_txt(bytes: &[u8]) -> Result<ParsedDocument, LoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| corrupt(DocumentFormat::Txt, format!("not valid utf-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    Ok(ParsedDocument::new(vec![text.to_string()], Vec::new()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::io::Write;

    /// Builds a PDF with one text line per page. Every page carries the same
    /// link annotation when `link` is set.
    pub fn pdf_with_pages(lines: &[&str], link: Option<&str>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let link_id = link.map(|uri| {
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => vec![0.into(), 0.into(), 200.into(), 20.into()],
                "A" => dictionary! {
                    "S" => "URI",
                    "URI" => Object::string_literal(uri),
                },
            })
        });

        let mut kids = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            };
            if let Some(link_id) = link_id {
                page.set("Annots", vec![Object::Reference(link_id)]);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// Builds a minimal DOCX container holding the given paragraphs.
    pub fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{p}</w:t></w:r></w:p>"#))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );

        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{docx_with_paragraphs, pdf_with_pages};
    use super::*;

    #[test]
    fn test_format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(".docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("txt"), Some(DocumentFormat::Txt));
        assert_eq!(DocumentFormat::from_extension("doc"), None);
    }

    #[test]
    fn test_raw_document_extension_uses_last_dot() {
        assert_eq!(RawDocument::new(Vec::new(), "jane.doe.resume.PDF").extension(), "PDF");
        assert_eq!(RawDocument::new(Vec::new(), "resume").extension(), "");
    }

    #[test]
    fn test_text_appends_links_section_last() {
        let doc = ParsedDocument::new(
            vec!["page one".to_string(), "page two".to_string()],
            vec![
                "https://github.com/jdoe".to_string(),
                "https://linkedin.com/in/jdoe".to_string(),
                "https://github.com/jdoe".to_string(),
            ],
        );
        assert_eq!(
            doc.text(),
            "page one\npage two\n\nLinks found in document:\nhttps://github.com/jdoe\nhttps://linkedin.com/in/jdoe"
        );
    }

    #[test]
    fn test_text_without_links_has_no_marker() {
        let doc = ParsedDocument::new(vec!["only text".to_string()], vec![]);
        assert_eq!(doc.text(), "only text");
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_rejected() {
        let err = load(Bytes::from_static(b"hello"), "rtf").await.unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat { ref extension } if extension == "rtf"));
    }

    #[tokio::test]
    async fn test_txt_strips_bom() {
        let parsed = load(Bytes::from("\u{feff}Jane Doe\nRust engineer"), "txt")
            .await
            .unwrap();
        assert_eq!(parsed.text(), "Jane Doe\nRust engineer");
        assert!(parsed.links().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_txt_is_corrupt() {
        let err = load(Bytes::from_static(&[0xff, 0xfe, 0xfd]), "txt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::CorruptDocument {
                format: DocumentFormat::Txt,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_garbage_pdf_is_corrupt() {
        let err = load(Bytes::from_static(b"definitely not a pdf"), "pdf")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::CorruptDocument {
                format: DocumentFormat::Pdf,
                ..
            }
        ));
    }

    fn spool_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(SPOOL_PREFIX) && n.ends_with(".pdf"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pdf_spool_removed_after_failed_parse() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_spooled_in(
            Bytes::from_static(b"definitely not a pdf"),
            "pdf",
            dir.path().to_path_buf(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::CorruptDocument { .. }));
        assert!(spool_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_pdf_spool_removed_after_successful_parse() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = pdf_with_pages(&["Jane Doe"], Some("https://github.com/jdoe"));
        let parsed = load_spooled_in(Bytes::from(bytes), "pdf", dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(parsed.links(), ["https://github.com/jdoe".to_string()]);
        assert!(spool_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_docx_paragraphs_become_lines() {
        let bytes = docx_with_paragraphs(&["Jane Doe", "Senior Engineer &amp; Mentor"]);
        let parsed = load(Bytes::from(bytes), "docx").await.unwrap();
        assert_eq!(parsed.text(), "Jane Doe\nSenior Engineer & Mentor");
        assert!(parsed.links().is_empty());
    }

    #[tokio::test]
    async fn test_docx_that_is_not_a_zip_is_corrupt() {
        let err = load(Bytes::from_static(b"PK but not really"), "docx")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::CorruptDocument {
                format: DocumentFormat::Docx,
                ..
            }
        ));
    }

    #[test]
    fn test_pdf_links_deduplicated_across_pages() {
        let bytes = pdf_with_pages(&["Page one", "Page two", "Page three"], Some("https://github.com/jdoe"));
        let document = Document::load_mem(&bytes).unwrap();
        assert_eq!(collect_pdf_links(&document), vec!["https://github.com/jdoe".to_string()]);
    }

    #[test]
    fn test_pdf_without_annotations_has_no_links() {
        let bytes = pdf_with_pages(&["Plain page"], None);
        let document = Document::load_mem(&bytes).unwrap();
        assert!(collect_pdf_links(&document).is_empty());
    }

    #[tokio::test]
    async fn test_pdf_text_ends_with_single_link_section() {
        let bytes = pdf_with_pages(&["Jane Doe", "Projects"], Some("https://github.com/jdoe"));
        let parsed = load(Bytes::from(bytes), "pdf").await.unwrap();
        let text = parsed.text();

        assert!(text.ends_with("Links found in document:\nhttps://github.com/jdoe"));
        assert_eq!(text.matches("https://github.com/jdoe").count(), 1);
        assert_eq!(parsed.pages().len(), 2);
    }
}
