//! The per-bank statement parsers and their registry.
//!
//! Each supported issuer encodes the same ledger in a structurally different
//! PDF. Every parser implements [`BankParser`]: a stable id, a text-signature
//! predicate used by detection, and a `parse` over either PDF bytes or a
//! pre-extracted text stream. Parsers are stateless; one instance serves
//! concurrent calls.

pub mod banque_populaire;
pub mod bnp;
pub mod cic;
pub mod lcl;
pub mod qonto;
pub mod societe_generale;

use std::sync::LazyLock;

use releve_pdf::PdfLine;

use crate::error::ParseError;
use crate::transaction::Transaction;

/// What a parser is given: the original PDF bytes, or a raw text stream when
/// the document was already flattened upstream.
#[derive(Debug, Clone, Copy)]
pub enum StatementInput<'a> {
    Pdf(&'a [u8]),
    Text(&'a str),
}

/// One bank's statement parser.
pub trait BankParser: Send + Sync {
    /// Stable short identifier (`"bnp"`, `"lcl"`, ...).
    fn id(&self) -> &'static str;

    /// Signature predicate. `flat_text` is uppercase-folded by the detector
    /// before this is called; implementations are substring checks on stable
    /// branding tokens.
    fn detect(&self, flat_text: &str) -> bool;

    /// Extract the transaction sequence. Returns `UnrecognizedFormat` when
    /// the table anchor cannot be located, `UnsupportedInput` when the
    /// parser needs positioned input but was handed raw text. Per-row
    /// lexical failures never escape; the row is dropped.
    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError>;
}

/// Insertion-ordered parser registry, built once per process.
///
/// CIC sits last: its detector is intentionally broad (`"CIC"`) and must not
/// shadow the specific ones when another bank's document happens to contain
/// the literal.
pub static REGISTRY: LazyLock<Vec<Box<dyn BankParser>>> = LazyLock::new(|| {
    vec![
        Box::new(bnp::Bnp) as Box<dyn BankParser>,
        Box::new(lcl::Lcl),
        Box::new(banque_populaire::BanquePopulaire),
        Box::new(qonto::Qonto),
        Box::new(societe_generale::SocieteGenerale),
        Box::new(cic::Cic),
    ]
});

/// Look up a parser by bank id.
pub fn find_parser(id: &str) -> Option<&'static dyn BankParser> {
    REGISTRY.iter().find(|p| p.id() == id).map(|b| b.as_ref())
}

/// Resolve the input to a flat text stream, extracting from the PDF when
/// needed. Used by the text-based parsers.
pub(crate) fn flat_text_of(input: StatementInput<'_>) -> Result<String, ParseError> {
    match input {
        StatementInput::Pdf(bytes) => Ok(releve_pdf::extract_flat_text(bytes)?),
        StatementInput::Text(text) => Ok(text.to_string()),
    }
}

/// Resolve the input to positioned lines. Geometry parsers cannot work from
/// a flat text stream.
pub(crate) fn positioned_lines_of(input: StatementInput<'_>) -> Result<Vec<PdfLine>, ParseError> {
    match input {
        StatementInput::Pdf(bytes) => Ok(releve_pdf::extract_positioned_lines(bytes)?),
        StatementInput::Text(_) => Err(ParseError::UnsupportedInput),
    }
}

/// Uppercase and strip French diacritics, so marker checks hit both
/// `DÉBIT` and `DEBIT` regardless of how the producer encoded the header.
pub(crate) fn fold_upper(s: &str) -> String {
    s.to_uppercase()
        .chars()
        .map(|c| match c {
            'À' | 'Â' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Î' | 'Ï' => 'I',
            'Ô' | 'Ö' => 'O',
            'Ù' | 'Û' | 'Ü' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ids_are_unique_and_cic_is_last() {
        let ids: Vec<&str> = REGISTRY.iter().map(|p| p.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len(), "duplicate bank id in registry");
        assert_eq!(*ids.last().unwrap(), "cic");
    }

    #[test]
    fn find_parser_resolves_every_registered_id() {
        for id in ["bnp", "lcl", "banque-populaire", "qonto", "societe-generale", "cic"] {
            assert!(find_parser(id).is_some(), "missing parser for {id}");
        }
        assert!(find_parser("credit-agricole").is_none());
    }

    #[test]
    fn fold_upper_strips_diacritics() {
        assert_eq!(fold_upper("Débit Crédit échéance"), "DEBIT CREDIT ECHEANCE");
    }

    #[test]
    fn positioned_lines_of_rejects_text() {
        assert!(matches!(
            positioned_lines_of(StatementInput::Text("flat")),
            Err(ParseError::UnsupportedInput),
        ));
    }
}
