//! DocQA Parser - Document parsing and chunking
//!
//! Supports parsing of:
//! - PDF documents
//! - Microsoft Word (DOCX)
//! - Markdown and plain text files
//!
//! Each parser implements the `DocumentParser` trait and produces a
//! `ParsedDocument` made of page units. The [`Chunker`] then splits those
//! pages into overlapping chunks that keep their source attribution.

use std::path::Path;
use thiserror::Error;

pub mod chunker;
pub mod docx;
pub mod pdf;

pub use chunker::Chunker;
pub use docx::DocxParser;
pub use pdf::PdfParser;

/// Page separator used by PDF text extraction and paginated text files
pub const PAGE_BREAK: char = '\x0C';

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// File format is not supported
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// PDF parsing error
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// DOCX parsing error
    #[error("DOCX parsing error: {0}")]
    DocxError(String),

    /// Encoding error
    #[error("Text encoding error: {0}")]
    EncodingError(String),
}

impl ParserError {
    /// Convert into the shared error taxonomy for the named document
    pub fn into_document_error(self, document: &str) -> docqa_core::DocQaError {
        docqa_core::DocQaError::InvalidDocument {
            document: document.to_string(),
            reason: self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// A unit of text with its page position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number, `None` for unpaginated documents
    pub number: Option<u32>,

    /// Extracted text
    pub text: String,
}

/// A parsed document split into page units
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Source name (usually the uploaded file name)
    pub name: String,

    /// Detected file type
    pub file_type: FileType,

    /// Page units in document order
    pub pages: Vec<PageText>,

    /// Title, if one could be detected
    pub title: Option<String>,
}

impl ParsedDocument {
    /// Create a new parsed document without pages
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            file_type,
            pages: Vec::new(),
            title: None,
        }
    }

    /// Build a document from text, splitting pages on form feeds.
    ///
    /// A text without form feeds becomes a single unpaginated unit.
    pub fn from_text(name: impl Into<String>, file_type: FileType, text: &str) -> Self {
        let mut doc = Self::new(name, file_type);

        if text.contains(PAGE_BREAK) {
            for (i, page) in text.split(PAGE_BREAK).enumerate() {
                doc.pages.push(PageText {
                    number: Some(i as u32 + 1),
                    text: page.to_string(),
                });
            }
        } else {
            doc.pages.push(PageText {
                number: None,
                text: text.to_string(),
            });
        }

        doc.title = doc
            .pages
            .iter()
            .flat_map(|p| p.text.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .filter(|l| l.chars().count() < 200)
            .map(|l| l.to_string());

        doc
    }

    /// Total character count over all pages
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    /// Whether any page carries non-whitespace text
    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.text.trim().is_empty())
    }
}

/// Supported file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Docx,
    Markdown,
    PlainText,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "md" | "markdown" => Self::Markdown,
            "txt" | "text" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a file name or path
    pub fn from_name(name: &str) -> Self {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
            Self::Markdown => write!(f, "markdown"),
            Self::PlainText => write!(f, "text"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from its raw bytes
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument>;

    /// Get supported file types
    fn supported_types(&self) -> &[FileType];

    /// Check if this parser can handle a file type
    fn can_parse(&self, file_type: FileType) -> bool {
        self.supported_types().contains(&file_type)
    }
}

// ============================================================================
// Parser Registry
// ============================================================================

/// Registry of available parsers
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the PDF, DOCX and text parsers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PdfParser::new());
        registry.register(DocxParser::new());
        registry.register(PlainTextParser);
        registry
    }

    /// Register a parser
    pub fn register<P: DocumentParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Find a parser for a file type
    pub fn find_parser(&self, file_type: FileType) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(file_type))
            .map(|p| p.as_ref())
    }

    /// Parse a file using the parser matching its extension
    pub fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_name(name);

        if file_type == FileType::Unknown {
            return Err(ParserError::UnsupportedFormat(
                Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            ));
        }

        let parser = self
            .find_parser(file_type)
            .ok_or_else(|| ParserError::UnsupportedFormat(file_type.to_string()))?;

        tracing::debug!(document = name, %file_type, bytes = bytes.len(), "Parsing document");
        parser.parse(name, bytes)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Plain text and markdown parser
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ParserError::EncodingError(format!("{name} is not valid UTF-8: {e}")))?;

        Ok(ParsedDocument::from_text(
            name,
            FileType::from_name(name),
            text,
        ))
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::PlainText, FileType::Markdown]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("pdf"), FileType::Pdf);
        assert_eq!(FileType::from_extension("PDF"), FileType::Pdf);
        assert_eq!(FileType::from_extension("docx"), FileType::Docx);
        assert_eq!(FileType::from_extension("md"), FileType::Markdown);
        assert_eq!(FileType::from_extension("xlsx"), FileType::Unknown);
        assert_eq!(FileType::from_name("reports/q3.txt"), FileType::PlainText);
        assert_eq!(FileType::from_name("no_extension"), FileType::Unknown);
    }

    #[test]
    fn test_from_text_splits_pages_on_form_feed() {
        let doc = ParsedDocument::from_text(
            "report.txt",
            FileType::PlainText,
            "Page one\x0CPage two\x0CPage three",
        );

        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[0].number, Some(1));
        assert_eq!(doc.pages[2].number, Some(3));
        assert_eq!(doc.pages[1].text, "Page two");
        assert_eq!(doc.title.as_deref(), Some("Page one"));
    }

    #[test]
    fn test_from_text_without_pages() {
        let doc = ParsedDocument::from_text("notes.md", FileType::Markdown, "# Notes\nbody");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].number, None);
    }

    #[test]
    fn test_registry_parses_text() {
        let registry = ParserRegistry::with_defaults();
        let doc = registry.parse("a.txt", b"hello world").unwrap();
        assert_eq!(doc.file_type, FileType::PlainText);
        assert_eq!(doc.char_count(), 11);
        assert!(doc.has_text());
    }

    #[test]
    fn test_registry_rejects_unknown_extension() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse("sheet.xlsx", b"data").unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedFormat(ext) if ext == "xlsx"));
    }

    #[test]
    fn test_plain_text_rejects_invalid_utf8() {
        let err = PlainTextParser
            .parse("bad.txt", &[0xff, 0xfe, 0x00])
            .unwrap_err();
        assert!(matches!(err, ParserError::EncodingError(_)));

        let doc_err = err.into_document_error("bad.txt");
        assert!(matches!(
            doc_err,
            docqa_core::DocQaError::InvalidDocument { document, .. } if document == "bad.txt"
        ));
    }
}
