//! DOCX document parser using docx-rs
//!
//! Extracts paragraph and table text from Microsoft Word documents. DOCX
//! carries no reliable page information, so the result is a single
//! unpaginated unit.

use docx_rs::read_docx;

use crate::{DocumentParser, FileType, PageText, ParsedDocument, ParserError, Result};

/// DOCX document parser
pub struct DocxParser {
    /// Render tables as markdown rows instead of dropping them
    pub include_tables: bool,
}

impl DocxParser {
    /// Create a new DOCX parser with default settings
    pub fn new() -> Self {
        Self {
            include_tables: true,
        }
    }

    /// Enable or disable table extraction
    pub fn with_tables(mut self, enabled: bool) -> Self {
        self.include_tables = enabled;
        self
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn is_heading(para: &docx_rs::Paragraph) -> bool {
    para.property
        .style
        .as_ref()
        .is_some_and(|style| style.val.to_lowercase().starts_with("heading"))
}

fn table_markdown(tbl: &docx_rs::Table) -> String {
    let mut md = String::new();

    for row in &tbl.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        md.push('|');

        for cell in &tr.cells {
            let docx_rs::TableRowChild::TableCell(tc) = cell;
            let mut cell_text = String::new();

            for child in &tc.children {
                if let docx_rs::TableCellContent::Paragraph(para) = child {
                    cell_text.push_str(&paragraph_text(para));
                }
            }

            md.push_str(&format!(" {} |", cell_text.trim()));
        }
        md.push('\n');
    }

    md
}

impl DocumentParser for DocxParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let docx = read_docx(bytes).map_err(|e| ParserError::DocxError(format!("{name}: {e}")))?;

        let mut content = String::new();
        let mut title = None;

        for child in docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(para) => {
                    let text = paragraph_text(&para);

                    if title.is_none() && is_heading(&para) && !text.trim().is_empty() {
                        title = Some(text.trim().to_string());
                    }

                    content.push_str(&text);
                    content.push('\n');
                }
                docx_rs::DocumentChild::Table(tbl) if self.include_tables => {
                    content.push_str(&table_markdown(&tbl));
                    content.push('\n');
                }
                _ => {}
            }
        }

        let mut doc = ParsedDocument::new(name, FileType::Docx);
        doc.pages.push(PageText {
            number: None,
            text: content,
        });
        doc.title = title;

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Docx]
    }
}
