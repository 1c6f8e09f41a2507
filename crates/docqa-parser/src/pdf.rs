//! PDF document parser using pdf-extract
//!
//! Extracts text content from PDF files page by page. pdf-extract separates
//! pages with form feed characters, which become page units.

use crate::{DocumentParser, FileType, PageText, ParsedDocument, ParserError, Result, PAGE_BREAK};

/// PDF document parser
pub struct PdfParser {
    /// Drop pages that carry no text (scanned images, blank separators)
    pub skip_blank_pages: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self {
            skip_blank_pages: true,
        }
    }

    /// Keep or drop blank pages
    pub fn with_blank_pages(mut self, keep: bool) -> Self {
        self.skip_blank_pages = !keep;
        self
    }

    /// Split extracted text into numbered pages
    fn split_pages(&self, text: &str) -> Vec<PageText> {
        let mut pages: Vec<PageText> = text
            .split(PAGE_BREAK)
            .enumerate()
            .map(|(i, page)| PageText {
                number: Some(i as u32 + 1),
                text: page.to_string(),
            })
            .collect();

        // pdf-extract terminates the last page with a form feed as well
        if pages.len() > 1 && pages.last().is_some_and(|p| p.text.trim().is_empty()) {
            pages.pop();
        }

        if self.skip_blank_pages {
            pages.retain(|p| !p.text.trim().is_empty());
        }

        pages
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParserError::PdfError(format!("{name}: {e}")))?;

        let mut doc = ParsedDocument::new(name, FileType::Pdf);
        doc.pages = self.split_pages(&text);

        // Try to extract title from the first non-empty line
        doc.title = doc
            .pages
            .first()
            .and_then(|p| p.text.lines().map(str::trim).find(|l| !l.is_empty()))
            .filter(|l| l.chars().count() < 200)
            .map(|l| l.to_string());

        tracing::debug!(document = name, pages = doc.pages.len(), "Extracted PDF text");

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Pdf]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_numbers_and_trailing_break() {
        let parser = PdfParser::new();
        let pages = parser.split_pages("First page\x0CSecond page\x0C");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, Some(1));
        assert_eq!(pages[1].number, Some(2));
        assert_eq!(pages[1].text, "Second page");
    }

    #[test]
    fn test_blank_pages_keep_numbering() {
        let parser = PdfParser::new();
        let pages = parser.split_pages("One\x0C  \n\x0CThree");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].number, Some(3));

        let keep = PdfParser::new().with_blank_pages(true);
        assert_eq!(keep.split_pages("One\x0C  \n\x0CThree").len(), 3);
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let parser = PdfParser::new();
        let err = parser.parse("broken.pdf", b"not a pdf at all").unwrap_err();
        assert!(matches!(err, ParserError::PdfError(_)));
    }

    #[test]
    fn test_supported_types() {
        let parser = PdfParser::new();
        assert!(parser.can_parse(FileType::Pdf));
        assert!(!parser.can_parse(FileType::Docx));
    }
}
