//! LCL statement parser (geometry-based).
//!
//! LCL keeps its columnar layout: the debit and credit header cells give the
//! two column x positions, and each row carries a short operation date, the
//! label, a long value date and the amount cell. Card payments get a second
//! pass: the aggregate `RELEVE CB` row is replaced by the per-payment detail
//! lines when the statement carries them.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use log::debug;
use regex::Regex;

use releve_pdf::{LineItem, PdfLine};

use crate::banks::{fold_upper, positioned_lines_of, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{
    find_amounts_in_line, normalize_spaces, parse_amount_fr, parse_date_fr, parse_date_fr_long,
    parse_short_date, AMOUNT_ITEM_RE, DATE_SLASH_RE, SHORT_DATE_ITEM_RE,
};
use crate::transaction::Transaction;

pub struct Lcl;

/// Statement period opener, e.g. `du 01/04/2025 au 30/04/2025`.
static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdu\s+(\d{2}/\d{2}/\d{4})").expect("lcl period regex"));

/// A long date item: `dd/mm/yy` or `dd/mm/yyyy` as the whole fragment.
static LONG_DATE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{2,4}$").expect("lcl long date item regex"));

/// Card detail rows: `LE dd/mm` followed by the payment amount.
static CARD_ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLE\s+(\d{2}/\d{2})\b").expect("lcl card row regex"));

static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPAGE \d+").expect("lcl page regex"));

const IGNORE_MARKERS: &[&str] = &[
    "SOLDE INTERMEDIAIRE",
    "SOLDE EN EUROS",
    "TOTAUX",
    "SOUS TOTAL",
    "RELEVE DE COMPTE",
    "MONTANT COMPTABILISE",
    "CREDIT LYONNAIS",
    "RELEVE D'IDENTITE",
];

/// Sections whose rows are debits when no column geometry is available.
const SECTION_MARKERS: &[&str] = &["PAIEMENTS PAR CARTE", "CHEQUES EMIS", "CHEQUES"];

impl BankParser for Lcl {
    fn id(&self) -> &'static str {
        "lcl"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("CREDIT LYONNAIS") || flat_text.contains("LCL.FR")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        let lines = positioned_lines_of(input)?;
        parse_lines(&lines)
    }
}

fn parse_lines(lines: &[PdfLine]) -> Result<Vec<Transaction>, ParseError> {
    let (debit_x, credit_x) = discover_columns(lines);
    let period_start = find_period_start(lines);
    let reference_year = period_start.year();

    let mut transactions: Vec<Transaction> = Vec::new();
    let mut section: Option<String> = None;

    for line in lines {
        let folded = fold_upper(&line.text);

        if folded.contains("ANCIEN SOLDE") {
            if let Some(txn) =
                ancien_solde_row(line, debit_x, credit_x, reference_year, period_start)
            {
                transactions.push(txn);
            }
            continue;
        }

        if is_ignored(&folded) || is_header(&folded) {
            continue;
        }

        if let Some(marker) = SECTION_MARKERS.iter().find(|m| folded.contains(*m)) {
            section = Some((*marker).to_string());
        }

        if let Some(txn) = transaction_row(
            line,
            debit_x,
            credit_x,
            reference_year,
            section.as_deref(),
        ) {
            transactions.push(txn);
        }
    }

    card_detail_pass(lines, reference_year, &mut transactions);

    Ok(transactions)
}

/// Scan for the table header (`DATE`, `LIBELLE`, `VALEUR`) and record the x
/// positions of its `DEBIT` and `CREDIT` cells.
fn discover_columns(lines: &[PdfLine]) -> (Option<f32>, Option<f32>) {
    for line in lines {
        let folded = fold_upper(&line.text);
        if is_header(&folded) {
            let mut debit_x = None;
            let mut credit_x = None;
            for item in &line.items {
                let item_folded = fold_upper(&item.text);
                if item_folded.contains("DEBIT") {
                    debit_x = Some(item.x);
                } else if item_folded.contains("CREDIT") {
                    credit_x = Some(item.x);
                }
            }
            return (debit_x, credit_x);
        }
    }
    (None, None)
}

fn is_header(folded: &str) -> bool {
    folded.contains("DATE") && folded.contains("LIBELLE") && folded.contains("VALEUR")
}

fn is_ignored(folded: &str) -> bool {
    IGNORE_MARKERS.iter().any(|m| folded.contains(m)) || PAGE_RE.is_match(folded)
}

/// The period opening date, used to supply the year of short row dates.
/// Falls back to today when the statement does not carry one.
fn find_period_start(lines: &[PdfLine]) -> NaiveDate {
    lines
        .iter()
        .find_map(|line| {
            PERIOD_RE
                .captures(&line.text)
                .and_then(|caps| parse_date_fr_long(&caps[1]).ok())
        })
        .unwrap_or_else(|| Utc::now().date_naive())
}

fn transaction_row(
    line: &PdfLine,
    debit_x: Option<f32>,
    credit_x: Option<f32>,
    reference_year: i32,
    section: Option<&str>,
) -> Option<Transaction> {
    let shorts: Vec<&LineItem> = line
        .items
        .iter()
        .filter(|i| SHORT_DATE_ITEM_RE.is_match(i.text.trim()))
        .collect();
    let longs: Vec<&LineItem> = line
        .items
        .iter()
        .filter(|i| LONG_DATE_ITEM_RE.is_match(i.text.trim()))
        .collect();

    // The operation date is the leftmost short date (else the leftmost
    // long); the value date is the rightmost long. A line with a single
    // long date and no short cannot fill both roles.
    let value_item = *longs.last()?;
    let operation_item = match shorts.first() {
        Some(item) => *item,
        None => {
            if longs.len() < 2 {
                return None;
            }
            longs[0]
        }
    };

    let amount_item = rightmost_amount_item(line)?;
    let magnitude = parse_amount_fr(amount_item.text.trim()).ok()?.abs();
    let amount = sign_amount(amount_item, magnitude, debit_x, credit_x, section);

    let date_operation = if SHORT_DATE_ITEM_RE.is_match(operation_item.text.trim()) {
        parse_short_date(operation_item.text.trim(), reference_year).ok()?
    } else {
        parse_date_fr(operation_item.text.trim()).ok()?
    };
    let date_valeur = parse_date_fr(value_item.text.trim()).ok();

    let label_parts: Vec<&str> = line
        .items
        .iter()
        .filter(|i| i.x > operation_item.x && i.x < value_item.x - 1.0)
        .map(|i| i.text.as_str())
        .collect();
    let mut label = normalize_spaces(&label_parts.join(" "));
    if label.is_empty() {
        label = normalize_spaces(&line.text);
    }

    Some(Transaction {
        date_operation,
        date_valeur,
        label,
        amount,
        raw: Some(line.text.clone()),
        page: Some(line.page),
        section: section.map(str::to_string),
    })
}

fn rightmost_amount_item(line: &PdfLine) -> Option<&LineItem> {
    line.items
        .iter()
        .filter(|i| AMOUNT_ITEM_RE.is_match(i.text.trim()))
        .last()
}

/// An explicit `-` wins; otherwise the column closer to the amount's x
/// decides; without geometry, card/cheque sections are debits.
fn sign_amount(
    item: &LineItem,
    magnitude: f64,
    debit_x: Option<f32>,
    credit_x: Option<f32>,
    section: Option<&str>,
) -> f64 {
    if item.text.contains(['-', '\u{2212}']) {
        return -magnitude;
    }
    match (debit_x, credit_x) {
        (Some(dx), Some(cx)) => {
            if (item.x - cx).abs() <= (item.x - dx).abs() {
                magnitude
            } else {
                -magnitude
            }
        }
        _ => {
            let in_debit_section = section
                .map(|s| {
                    let folded = fold_upper(s);
                    folded.contains("CARTE") || folded.contains("CHEQUE")
                })
                .unwrap_or(false);
            if in_debit_section {
                -magnitude
            } else {
                magnitude
            }
        }
    }
}

/// The opening balance row is kept as a transaction of its own.
fn ancien_solde_row(
    line: &PdfLine,
    debit_x: Option<f32>,
    credit_x: Option<f32>,
    reference_year: i32,
    period_start: NaiveDate,
) -> Option<Transaction> {
    let amount_item = rightmost_amount_item(line)?;
    let magnitude = parse_amount_fr(amount_item.text.trim()).ok()?.abs();

    let amount = match (debit_x, credit_x) {
        (Some(dx), Some(cx)) => {
            if (amount_item.x - cx).abs() <= (amount_item.x - dx).abs() {
                magnitude
            } else {
                -magnitude
            }
        }
        _ => -magnitude,
    };

    let date_operation = line
        .items
        .iter()
        .find(|i| SHORT_DATE_ITEM_RE.is_match(i.text.trim()))
        .and_then(|i| parse_short_date(i.text.trim(), reference_year).ok())
        .unwrap_or(period_start);

    Some(Transaction {
        date_operation,
        date_valeur: None,
        label: "ANCIEN SOLDE".to_string(),
        amount,
        raw: Some(line.text.clone()),
        page: Some(line.page),
        section: None,
    })
}

/// Replace the aggregate card row with the per-payment detail lines.
///
/// The `MONTANT COMPTABILISE` marker supplies the shared value date and,
/// crucially, flips the "details found" switch before any detail row parses:
/// `RELEVE CB` aggregates are suppressed even when the pass emits nothing.
fn card_detail_pass(lines: &[PdfLine], reference_year: i32, transactions: &mut Vec<Transaction>) {
    let mut card_value_date: Option<NaiveDate> = None;
    let mut details_found = false;

    for line in lines {
        if fold_upper(&line.text).contains("MONTANT COMPTABILISE") {
            details_found = true;
            card_value_date = DATE_SLASH_RE
                .find(&line.text)
                .and_then(|m| parse_date_fr(m.as_str()).ok());
            break;
        }
    }

    if !details_found {
        return;
    }

    transactions.retain(|t| !fold_upper(&t.label).contains("RELEVE CB"));

    for line in lines {
        let folded = fold_upper(&line.text);
        if is_ignored(&folded) || is_header(&folded) {
            continue;
        }
        // Detail rows carry only the short `LE dd/mm` date.
        if DATE_SLASH_RE.is_match(&line.text) {
            continue;
        }

        let Some(caps) = CARD_ROW_RE.captures(&line.text) else {
            continue;
        };
        let tail_start = caps.get(0).unwrap().end();
        let tail = &line.text[tail_start..];
        let Some(amount) = find_amounts_in_line(tail).into_iter().next() else {
            continue;
        };
        let Ok(date_operation) = parse_short_date(&caps[1], reference_year) else {
            debug!("lcl: bad card detail date in {:?}", line.text);
            continue;
        };

        let mut label = normalize_spaces(&tail[..amount.start]);
        if label.is_empty() {
            label = normalize_spaces(&line.text);
        }

        transactions.push(Transaction {
            date_operation,
            date_valeur: card_value_date,
            label,
            amount: -amount.value.abs(),
            raw: Some(line.text.clone()),
            page: Some(line.page),
            section: Some("PAIEMENTS PAR CARTE".to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(page: usize, items: &[(&str, f32)]) -> PdfLine {
        let items: Vec<LineItem> = items
            .iter()
            .map(|(text, x)| LineItem {
                text: (*text).to_string(),
                x: *x,
            })
            .collect();
        let text = items
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        PdfLine { text, items, page }
    }

    fn header() -> PdfLine {
        line(
            1,
            &[
                ("DATE", 30.0),
                ("LIBELLE", 100.0),
                ("VALEUR", 300.0),
                ("DEBIT", 380.0),
                ("CREDIT", 470.0),
            ],
        )
    }

    fn period() -> PdfLine {
        line(1, &[("du 01/04/2025 au 30/04/2025", 30.0)])
    }

    #[test]
    fn card_rows_under_debit_column_are_negative() {
        let lines = vec![
            period(),
            header(),
            line(1, &[("PAIEMENTS PAR CARTES", 30.0)]),
            line(
                1,
                &[
                    ("05.04", 30.0),
                    ("PAIEMENT CB CARREFOUR", 100.0),
                    ("07/04/2025", 300.0),
                    ("45,60", 390.0),
                ],
            ),
            line(
                1,
                &[
                    ("09.04", 30.0),
                    ("PAIEMENT CB SNCF", 100.0),
                    ("10/04/2025", 300.0),
                    ("112,00", 385.0),
                ],
            ),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert_eq!(txns.len(), 2);
        assert!(txns.iter().all(|t| t.amount < 0.0));
        assert_eq!(txns[0].amount, -45.60);
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 5).unwrap(),
        );
        assert_eq!(
            txns[0].date_valeur,
            Some(NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()),
        );
        assert_eq!(txns[0].label, "PAIEMENT CB CARREFOUR");
    }

    #[test]
    fn credit_column_amount_is_positive() {
        let lines = vec![
            period(),
            header(),
            line(
                1,
                &[
                    ("02.04", 30.0),
                    ("VIREMENT SALAIRE", 100.0),
                    ("02/04/2025", 300.0),
                    ("2 500,00", 465.0),
                ],
            ),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 2500.00);
    }

    #[test]
    fn card_details_replace_releve_cb_aggregate() {
        let lines = vec![
            period(),
            header(),
            line(
                1,
                &[
                    ("02.04", 30.0),
                    ("RELEVE CB DU MOIS", 100.0),
                    ("01/04/2025", 300.0),
                    ("150,00", 390.0),
                ],
            ),
            line(2, &[("MONTANT COMPTABILISE LE 30/04/2025", 30.0)]),
            line(2, &[("LE 12/04 AMAZON EU SARL 19,99", 30.0)]),
            line(2, &[("LE 14/04 FNAC PARIS 35,50", 30.0)]),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert!(txns.iter().all(|t| !t.label.contains("RELEVE CB")));
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].amount, -19.99);
        assert_eq!(txns[0].label, "AMAZON EU SARL");
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 12).unwrap(),
        );
        assert_eq!(
            txns[0].date_valeur,
            Some(NaiveDate::from_ymd_opt(2025, 4, 30).unwrap()),
        );
        assert_eq!(txns[0].section.as_deref(), Some("PAIEMENTS PAR CARTE"));
    }

    #[test]
    fn releve_cb_is_suppressed_even_without_detail_rows() {
        // The marker alone flips the switch; zero detail rows still remove
        // the aggregate.
        let lines = vec![
            period(),
            header(),
            line(
                1,
                &[
                    ("02.04", 30.0),
                    ("RELEVE CB DU MOIS", 100.0),
                    ("01/04/2025", 300.0),
                    ("150,00", 390.0),
                ],
            ),
            line(2, &[("MONTANT COMPTABILISE LE 30/04/2025", 30.0)]),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert!(txns.is_empty());
    }

    #[test]
    fn ancien_solde_becomes_a_transaction() {
        let lines = vec![
            period(),
            header(),
            line(
                1,
                &[("ANCIEN SOLDE", 100.0), ("03.04", 250.0), ("320,45", 390.0)],
            ),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].label, "ANCIEN SOLDE");
        assert_eq!(txns[0].amount, -320.45);
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
        );
    }

    #[test]
    fn explicit_minus_overrides_column_position() {
        let lines = vec![
            period(),
            header(),
            line(
                1,
                &[
                    ("02.04", 30.0),
                    ("ANNULATION", 100.0),
                    ("02/04/2025", 300.0),
                    ("-12,00", 465.0),
                ],
            ),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert_eq!(txns[0].amount, -12.00);
    }

    #[test]
    fn noise_lines_are_ignored() {
        let lines = vec![
            period(),
            header(),
            line(1, &[("SOLDE INTERMEDIAIRE", 100.0), ("1 000,00", 390.0)]),
            line(1, &[("TOTAUX", 100.0), ("2 000,00", 390.0)]),
            line(1, &[("PAGE 2", 100.0)]),
        ];

        let txns = parse_lines(&lines).unwrap();
        assert!(txns.is_empty());
    }

    #[test]
    fn raw_text_input_is_unsupported() {
        assert!(matches!(
            Lcl.parse(StatementInput::Text("DATE LIBELLE VALEUR")),
            Err(ParseError::UnsupportedInput),
        ));
    }

    #[test]
    fn detect_branding() {
        assert!(Lcl.detect("CREDIT LYONNAIS"));
        assert!(Lcl.detect("WWW.LCL.FR"));
        assert!(!Lcl.detect("BNP PARIBAS"));
    }
}
