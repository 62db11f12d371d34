//! Banque Populaire statement parser (text-based).
//!
//! Rows come out of the flat text as `dateCompta LABEL dateOperation
//! dateValeur AMOUNT [merchant tail]`, with up to three short `dd/mm` dates
//! per row. The table is re-segmented on anchor dates (a short date whose
//! next token is a letter, i.e. the start of a row), the amount is the first
//! optionally-signed match after the value date, and the label glues the
//! pre-date part to whatever follows the amount.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use log::debug;
use regex::Regex;

use crate::banks::{flat_text_of, fold_upper, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{normalize_spaces, parse_amount_fr, parse_short_date, AMOUNT_PATTERN};
use crate::transaction::Transaction;

pub struct BanquePopulaire;

static TABLE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DATE\s*COMPTA(?:\s*DATE\s*OPERATION)?").expect("bp table start regex")
});

const TABLE_END_MARKERS: &[&str] = &[
    "TOTAL DES MOUVEMENTS",
    "DETAIL DE VOS MOUVEMENTS",
    "DETAIL DES MOUVEMENTS",
];

const DROP_MARKERS: &[&str] = &["SOLDE CREDITEUR", "SOLDE DEBITEUR", "TOTAL DES MOUVEMENTS"];

/// Statement period closer, e.g. `au 30/04/2025`; supplies the year of
/// every short row date.
static PERIOD_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bau\s+\d{2}/\d{2}/(\d{4})").expect("bp period regex"));

static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}").expect("bp short date regex"));

static SIGNED_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("([-\u{2212}])?\\s*({})", AMOUNT_PATTERN)).expect("bp amount regex")
});

/// Standalone currency token; `EMPLOYEUR` and friends must survive.
static EUR_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bEUR\b").expect("bp eur token regex"));

impl BankParser for BanquePopulaire {
    fn id(&self) -> &'static str {
        "banque-populaire"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("BANQUE POPULAIRE")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        let text = flat_text_of(input)?;
        parse_text(&text)
    }
}

fn parse_text(text: &str) -> Result<Vec<Transaction>, ParseError> {
    let start = TABLE_START_RE
        .find(text)
        .ok_or(ParseError::UnrecognizedFormat)?;
    let rest = &text[start.end()..];
    let end = TABLE_END_MARKERS
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());

    let year = PERIOD_END_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .unwrap_or_else(|| Utc::now().year());

    let table = normalize_spaces(&rest[..end]);
    let anchors = row_anchors(&table);

    let mut transactions = Vec::new();
    for (i, &anchor) in anchors.iter().enumerate() {
        let segment_end = anchors.get(i + 1).copied().unwrap_or(table.len());
        let segment = &table[anchor..segment_end];
        match build_transaction(segment, year) {
            Some(txn) => transactions.push(txn),
            None => debug!("banque-populaire: dropped segment {:?}", segment),
        }
    }

    Ok(transactions)
}

/// A row anchor is a short `dd/mm` (not part of a longer date) whose next
/// token starts with a letter -- the first position that cannot be another
/// date of the same row or the amount.
fn row_anchors(table: &str) -> Vec<usize> {
    short_dates(table)
        .into_iter()
        .filter(|m| {
            let mut tail = table[m.1..].chars();
            matches!(tail.next(), Some(' ')) && matches!(tail.next(), Some(c) if c.is_alphabetic())
        })
        .map(|m| m.0)
        .collect()
}

/// All bare `dd/mm` spans, excluding fragments of `dd/mm/yyyy`.
fn short_dates(text: &str) -> Vec<(usize, usize)> {
    SHORT_DATE_RE
        .find_iter(text)
        .filter(|m| {
            let before_ok = text[..m.start()]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_ascii_digit() && c != '/');
            let after_ok = text[m.end()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_ascii_digit() && c != '/');
            before_ok && after_ok
        })
        .map(|m| (m.start(), m.end()))
        .collect()
}

fn build_transaction(segment: &str, year: i32) -> Option<Transaction> {
    let folded = fold_upper(segment);
    if DROP_MARKERS.iter().any(|m| folded.contains(m)) {
        return None;
    }

    // Up to three short dates play compta / operation / valeur; missing
    // roles duplicate rightward.
    let dates = short_dates(segment);
    let compta = *dates.first()?;
    let operation = dates.get(1).copied().unwrap_or(compta);
    let valeur = dates.get(2).copied().unwrap_or(operation);

    let amount_match = SIGNED_AMOUNT_RE
        .captures_iter(segment)
        .find(|caps| caps.get(0).unwrap().start() >= valeur.1)?;
    let magnitude = parse_amount_fr(&amount_match[2]).ok()?.abs();
    let amount = if amount_match.get(1).is_some() {
        -magnitude
    } else {
        magnitude
    };

    let date_operation = parse_short_date(&segment[operation.0..operation.1], year).ok()?;
    let date_valeur = parse_short_date(&segment[valeur.0..valeur.1], year).ok();

    let head = &segment[compta.1..operation.0];
    let tail = &segment[amount_match.get(0).unwrap().end()..];
    let mut label = normalize_spaces(&format!("{} {}", head, scrub_tail(tail)));
    if label.is_empty() {
        label = normalize_spaces(segment);
    }

    Some(Transaction {
        date_operation,
        date_valeur,
        label,
        amount,
        raw: Some(segment.to_string()),
        page: None,
        section: None,
    })
}

/// Strip the currency suffix and the ligature junk some producers leave in
/// the merchant tail.
fn scrub_tail(tail: &str) -> String {
    EUR_TOKEN_RE
        .replace_all(tail, " ")
        .replace('\u{20AC}', " ")
        .chars()
        .filter(|c| !matches!(c, '\u{FB00}'..='\u{FB06}' | '\u{FFFD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn adjacent_date_triplet_row() {
        let text = "BANQUE POPULAIRE du 01/04/2025 au 30/04/2025 \
DATECOMPTADATEOPERATION 17/04 17/04 17/04 ACHAT X 12,34 \
TOTAL DES MOUVEMENTS 12,34";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 12.34);
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 17).unwrap(),
        );
    }

    #[test]
    fn minus_before_amount_makes_it_a_debit() {
        let text = "au 30/04/2025 DATE COMPTA \
17/04 17/04 17/04 ACHAT X - 12,34 \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, -12.34);
    }

    #[test]
    fn full_row_shape_with_label_and_merchant_tail() {
        let text = "au 30/04/2025 DATE COMPTA DATE OPERATION \
22/04 PRLV SEPA FREE MOBILE 23/04 23/04 19,99 REF ABONNEMENT \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 19.99);
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 23).unwrap(),
        );
        assert_eq!(
            txns[0].date_valeur,
            Some(NaiveDate::from_ymd_opt(2025, 4, 23).unwrap()),
        );
        assert_eq!(txns[0].label, "PRLV SEPA FREE MOBILE REF ABONNEMENT");
    }

    #[test]
    fn multiple_rows_are_segmented_on_anchors() {
        let text = "au 30/04/2025 DATE COMPTA \
22/04 PRLV SEPA FREE MOBILE 23/04 23/04 19,99 \
25/04 VIR RECU LOYER 26/04 26/04 450,00 \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].amount, 19.99);
        assert_eq!(txns[1].amount, 450.00);
        assert_eq!(
            txns[1].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 26).unwrap(),
        );
    }

    #[test]
    fn row_without_amount_is_dropped() {
        let text = "au 30/04/2025 DATE COMPTA \
22/04 OPERATION SANS MONTANT 23/04 23/04 \
25/04 VIR RECU LOYER 26/04 26/04 450,00 \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 450.00);
    }

    #[test]
    fn balance_rows_are_dropped() {
        let text = "au 30/04/2025 DATE COMPTA \
01/04 SOLDE CREDITEUR AU 31/03 1 000,00 \
22/04 PRLV SEPA FREE MOBILE 23/04 23/04 19,99 \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 19.99);
    }

    #[test]
    fn missing_anchor_marker_is_unrecognized() {
        assert!(matches!(
            parse_text("BANQUE POPULAIRE RELEVE SANS TABLEAU"),
            Err(ParseError::UnrecognizedFormat),
        ));
    }

    #[test]
    fn year_falls_back_to_current_utc_year() {
        let text = "DATE COMPTA 17/04 17/04 17/04 ACHAT X 12,34";
        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].date_operation.year(), Utc::now().year());
    }

    #[test]
    fn eur_suffix_is_scrubbed_from_the_tail() {
        let text = "au 30/04/2025 DATE COMPTA \
22/04 CARTE 23/04 23/04 19,99 EUR CARREFOUR \
TOTAL DES MOUVEMENTS";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns[0].label, "CARTE CARREFOUR");
    }

    #[test]
    fn detect_branding() {
        assert!(BanquePopulaire.detect("BANQUE POPULAIRE VAL DE FRANCE"));
        assert!(!BanquePopulaire.detect("QONTO"));
    }
}
