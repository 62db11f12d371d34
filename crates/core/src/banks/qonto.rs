//! Qonto statement parser (text-based).
//!
//! Qonto rows are the simplest of the lot: a short `dd/mm` date, the
//! counterparty label, then an explicitly signed amount with an `EUR`
//! suffix. The flat text is re-split so every short date starts a line,
//! then each kept line is read left to right.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use log::debug;
use regex::Regex;

use crate::banks::{flat_text_of, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{normalize_spaces, parse_amount_fr, parse_short_date};
use crate::transaction::Transaction;

pub struct Qonto;

/// Statement period opener, e.g. `Du 01/03/2025 au 31/03/2025`.
static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdu\s+\d{2}/\d{2}/(\d{4})").expect("qonto period regex"));

static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}").expect("qonto short date regex"));

/// Signed amount with `EUR` suffix. The magnitude admits space, NBSP and
/// dot separators (`+1 234,56 EUR`).
static AMOUNT_EUR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("([+-])\\s*(\\d(?:[\\d \u{A0}.,]*\\d)?)\\s*EUR").expect("qonto amount regex")
});

/// Boilerplate line the statements repeat; kept as the exact literal.
const ENVY_DE_LIVE: &str = "ENVY DE LIVE";

impl BankParser for Qonto {
    fn id(&self) -> &'static str {
        "qonto"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("QONTO") || flat_text.contains("QNTOFRP")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        let text = flat_text_of(input)?;
        parse_text(&text)
    }
}

fn parse_text(text: &str) -> Result<Vec<Transaction>, ParseError> {
    let year = PERIOD_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .unwrap_or_else(|| Utc::now().year());

    let mut transactions = Vec::new();

    for line in resegment(text) {
        if !starts_with_short_date(&line) {
            continue;
        }
        if line.starts_with(ENVY_DE_LIVE) || line.contains("DATE DE VALEUR") {
            continue;
        }

        match build_transaction(&line, year) {
            Some(txn) => transactions.push(txn),
            None => debug!("qonto: dropped line {:?}", line),
        }
    }

    Ok(transactions)
}

/// Break the stream before every bare `dd/mm` followed by whitespace
/// (fragments of `dd/mm/yyyy` stay put), then normalize each line.
fn resegment(text: &str) -> Vec<String> {
    let mut out = String::with_capacity(text.len() + 64);
    let mut last = 0;

    for m in SHORT_DATE_RE.find_iter(text) {
        let before_ok = text[..m.start()]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_ascii_digit() && c != '/');
        let after_ok = text[m.end()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace);
        if before_ok && after_ok {
            out.push_str(&text[last..m.start()]);
            out.push('\n');
            last = m.start();
        }
    }
    out.push_str(&text[last..]);

    out.lines()
        .map(normalize_spaces)
        .filter(|line| !line.is_empty())
        .collect()
}

fn starts_with_short_date(line: &str) -> bool {
    line.len() >= 5
        && line.is_char_boundary(5)
        && SHORT_DATE_RE
            .find(line)
            .map(|m| m.start() == 0 && m.end() == 5)
            .unwrap_or(false)
        && !line[5..].starts_with('/')
}

fn build_transaction(line: &str, year: i32) -> Option<Transaction> {
    let date_token = &line[..5];
    let date = parse_short_date(date_token, year).ok()?;

    let caps = AMOUNT_EUR_RE.captures(line)?;
    let magnitude = parse_amount_fr(&caps[2]).ok()?.abs();
    let amount = if &caps[1] == "-" { -magnitude } else { magnitude };

    let mut label = normalize_spaces(&line[5..caps.get(0).unwrap().start()]);
    if label.is_empty() {
        label = normalize_spaces(line);
    }

    Some(Transaction {
        date_operation: date,
        date_valeur: Some(date),
        label,
        amount,
        raw: Some(line.to_string()),
        page: None,
        section: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn signed_rows_parse_with_period_year() {
        let text = "QONTO Relevé de compte Du 01/03/2025 au 31/03/2025 \
15/03 STRIPE PAYMENT +1 234,56 EUR 16/03 OVH +0,00 EUR 17/03 FEE -2,00 EUR";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 3);

        assert_eq!(txns[0].amount, 1234.56);
        assert_eq!(txns[0].label, "STRIPE PAYMENT");
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        );
        assert_eq!(txns[0].date_valeur, txns[0].date_operation.into());

        // A zero amount still matches the pattern; the row is kept.
        assert_eq!(txns[1].amount, 0.00);
        assert_eq!(txns[1].label, "OVH");

        assert_eq!(txns[2].amount, -2.00);
        assert_eq!(txns[2].label, "FEE");
    }

    #[test]
    fn line_without_amount_is_dropped() {
        let text = "Du 01/03/2025 au 31/03/2025 15/03 VIREMENT SANS MONTANT 16/03 OK +5,00 EUR";
        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 5.00);
    }

    #[test]
    fn header_and_boilerplate_lines_are_filtered() {
        let text = "Du 01/03/2025 au 31/03/2025 \
DATE DE VALEUR LIBELLE MONTANT \
15/03 DATE DE VALEUR RAPPEL +1,00 EUR \
15/03 STRIPE +2,00 EUR";

        let txns = parse_text(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].label, "STRIPE");
    }

    #[test]
    fn long_dates_do_not_start_rows() {
        let text = "Du 01/03/2025 au 31/03/2025 15/03 STRIPE +2,00 EUR";
        let txns = parse_text(text).unwrap();
        // Neither period date may be mistaken for a row.
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].label, "STRIPE");
    }

    #[test]
    fn year_falls_back_to_current_utc_year() {
        let txns = parse_text("15/03 STRIPE +2,00 EUR").unwrap();
        assert_eq!(txns[0].date_operation.year(), Utc::now().year());
    }

    #[test]
    fn detect_branding_and_bic() {
        assert!(Qonto.detect("QONTO - OLINDA SAS"));
        assert!(Qonto.detect("BIC QNTOFRP21XXX"));
        assert!(!Qonto.detect("SOCIETE GENERALE"));
    }
}
