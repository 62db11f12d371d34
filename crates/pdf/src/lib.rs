//! PDF text extraction for bank statements.
//!
//! This crate exposes two operations over a PDF byte buffer:
//!
//! - [`extract_flat_text`]: every text fragment of the document concatenated
//!   into one string, pages separated by a newline. This is what bank
//!   detection and the text-based statement parsers consume.
//! - [`extract_positioned_lines`]: visual rows reconstructed from glyph-run
//!   coordinates, one [`PdfLine`] per row, with per-fragment x offsets
//!   preserved. The geometry-based parsers need these offsets to tell a
//!   debit column from a credit column.
//!
//! The content-stream interpretation lives behind the
//! [`parser::backend::PdfBackend`] trait so the layout state machine can be
//! tested against fixture operation streams without a real document.

use thiserror::Error;

pub mod parser;

use crate::parser::backend::PdfBackend;

pub use parser::layout::{LineItem, PdfLine};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("cannot load PDF document: {0}")]
    Load(String),
    #[error("document is encrypted")]
    Encrypted,
    #[error("PDF parsing error: {0}")]
    Parse(String),
}

/// Concatenate every text fragment of the document, in content-stream order,
/// inserting a newline between pages.
pub fn extract_flat_text(bytes: &[u8]) -> Result<String, PdfError> {
    let backend = parser::backend::LopdfBackend::load_bytes(bytes)?;
    let mut out = String::new();

    for (i, (_page_num, page_id)) in backend.pages().into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let runs = parser::layout::extract_page_runs(&backend, page_id)?;
        for (j, run) in runs.iter().enumerate() {
            if j > 0 {
                out.push(' ');
            }
            out.push_str(&run.text);
        }
    }

    Ok(out)
}

/// Reconstruct the visual rows of every page, top-to-bottom, pages in
/// ascending order. Empty rows are skipped.
pub fn extract_positioned_lines(bytes: &[u8]) -> Result<Vec<PdfLine>, PdfError> {
    let backend = parser::backend::LopdfBackend::load_bytes(bytes)?;
    let mut lines: Vec<PdfLine> = Vec::new();

    for (page_num, page_id) in backend.pages() {
        let runs = parser::layout::extract_page_runs(&backend, page_id)?;
        lines.extend(parser::layout::reflow_lines(runs, page_num as usize));
    }

    Ok(lines)
}
