//! Bank auto-detection: an ordered sweep of the registry's signature
//! predicates over the uppercase-folded flat text.

use crate::banks::{fold_upper, REGISTRY};

/// Return the first registered parser whose signature matches, or `None`.
///
/// The text is uppercase-folded (diacritics stripped) once, then each
/// predicate runs in the registry's insertion order, so the broad CIC
/// detector only fires when no specific bank matched first.
pub fn detect_from_text(flat_text: &str) -> Option<&'static str> {
    let upper = fold_upper(flat_text);
    REGISTRY.iter().find(|p| p.detect(&upper)).map(|p| p.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_bank_from_its_branding() {
        let cases = [
            ("Relevé de compte BNP Paribas SA", "bnp"),
            ("Crédit Lyonnais - www.lcl.fr", "lcl"),
            ("BANQUE POPULAIRE RIVES DE PARIS", "banque-populaire"),
            ("Qonto - Olinda SAS", "qonto"),
            ("SOCIETE GENERALE 552 120 222 RCS PARIS", "societe-generale"),
            ("CREDIT INDUSTRIEL ET COMMERCIAL", "cic"),
        ];

        for (text, expected) in cases {
            assert_eq!(detect_from_text(text), Some(expected), "for {text:?}");
        }
    }

    #[test]
    fn detection_is_exclusive_per_fixture() {
        // Each branding fixture must trigger exactly one predicate.
        let fixtures = [
            ("BNP PARIBAS", "bnp"),
            ("CREDIT LYONNAIS", "lcl"),
            ("BANQUE POPULAIRE", "banque-populaire"),
            ("QNTOFRP21XXX", "qonto"),
            ("SOCIETE GENERALE", "societe-generale"),
        ];

        for (text, expected) in fixtures {
            let upper = fold_upper(text);
            let matching: Vec<&str> = REGISTRY
                .iter()
                .filter(|p| p.detect(&upper))
                .map(|p| p.id())
                .collect();
            assert_eq!(matching, vec![expected], "for {text:?}");
        }
    }

    #[test]
    fn cic_yields_to_more_specific_banks() {
        // A BNP statement mentioning a CIC counterparty must detect as BNP.
        assert_eq!(
            detect_from_text("BNP PARIBAS VIREMENT RECU DE CIC LYON"),
            Some("bnp"),
        );
    }

    #[test]
    fn unknown_document_detects_nothing() {
        assert_eq!(detect_from_text("CREDIT AGRICOLE CENTRE LOIRE"), None);
    }
}
