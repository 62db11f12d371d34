//! Multi-bank French statement parsing engine.
//!
//! Given a PDF byte stream and a bank identifier, this crate extracts a
//! canonical sequence of [`Transaction`]s -- operation date, value date,
//! label, signed EUR amount. Each supported issuer (BNP Paribas, LCL, CIC,
//! Banque Populaire, Qonto, Société Générale) encodes the same ledger in a
//! structurally different PDF, so the engine combines:
//!
//! - a geometric text-reflow layer (`releve-pdf`),
//! - per-issuer state machines ([`banks`]),
//! - French numeric/date lexing ([`lexical`]),
//! - a bank auto-detection sweep ([`detect`]).
//!
//! The two entry points mirror what the HTTP layer consumes:
//!
//! - [`detect`](fn@detect) -- flat-extract the document and return the first
//!   matching bank id, or `None`.
//! - [`parse`] -- run the identified bank's parser over the bytes.
//!
//! No state is shared between concurrent calls except the read-only parser
//! [`banks::REGISTRY`] and the compiled regex statics, both immutable after
//! first use. Callers bound execution with a wall-clock timeout; there is no
//! in-flight cancellation.

pub mod banks;
pub mod detect;
pub mod error;
pub mod lexical;
pub mod transaction;

pub use banks::{find_parser, BankParser, StatementInput, REGISTRY};
pub use error::ParseError;
pub use transaction::{to_cents, totals_cents, Totals, Transaction};

/// Identify the issuing bank of a statement, or `None` when no registered
/// signature matches.
pub fn detect(bytes: &[u8]) -> Result<Option<&'static str>, ParseError> {
    let flat = releve_pdf::extract_flat_text(bytes)?;
    Ok(detect::detect_from_text(&flat))
}

/// Parse a statement with the given bank's parser.
///
/// An unregistered `bank_id` fails with [`ParseError::UnknownBank`]. Any
/// structural error from the parser is wrapped in
/// [`ParseError::ParseFailed`], carrying the extracted flat text when the
/// document still yielded one (consumed by the `PDF_TEXT_DEBUG` diagnostic
/// path). There is no partial success: either a transaction list, possibly
/// empty, or a surfaced failure.
pub fn parse(bytes: &[u8], bank_id: &str) -> Result<Vec<Transaction>, ParseError> {
    let parser =
        find_parser(bank_id).ok_or_else(|| ParseError::UnknownBank(bank_id.to_string()))?;

    match parser.parse(StatementInput::Pdf(bytes)) {
        Ok(transactions) => Ok(transactions),
        Err(source) => Err(ParseError::ParseFailed {
            source: Box::new(source),
            extracted_text: releve_pdf::extract_flat_text(bytes).ok(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bank_id_is_surfaced_bare() {
        assert!(matches!(
            parse(b"%PDF-1.4", "credit-agricole"),
            Err(ParseError::UnknownBank(id)) if id == "credit-agricole",
        ));
    }

    #[test]
    fn unloadable_pdf_is_wrapped_in_parse_failed() {
        let err = parse(b"not a pdf at all", "bnp").unwrap_err();
        match err {
            ParseError::ParseFailed {
                source,
                extracted_text,
            } => {
                assert!(matches!(*source, ParseError::PdfLoad(_)));
                assert!(extracted_text.is_none());
            }
            other => panic!("expected ParseFailed, got {other:?}"),
        }
    }
}
