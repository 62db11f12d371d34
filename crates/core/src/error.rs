use thiserror::Error;

/// Every way a statement parse can fail.
///
/// `InvalidAmount` and `InvalidDate` are row-local: parsers swallow them and
/// drop the offending row. The remaining variants are structural and escape
/// to the caller -- the engine never returns a partial transaction list
/// alongside an error.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid French amount: {0:?}")]
    InvalidAmount(String),

    #[error("invalid French date: {0:?}")]
    InvalidDate(String),

    #[error("statement table not recognized")]
    UnrecognizedFormat,

    #[error("this parser requires positioned PDF input")]
    UnsupportedInput,

    #[error("unknown bank id: {0:?}")]
    UnknownBank(String),

    #[error("PDF load error: {0}")]
    PdfLoad(#[from] releve_pdf::PdfError),

    /// Wraps any structural error leaving [`crate::parse`]. When the PDF
    /// still yielded text, that text rides along so a debug caller
    /// (`PDF_TEXT_DEBUG=1`) can hand it back as a diagnostic.
    #[error("statement parse failed: {source}")]
    ParseFailed {
        source: Box<ParseError>,
        extracted_text: Option<String>,
    },
}
