//! Société Générale statement parser (dual-path).
//!
//! The geometry path works on positioned lines: rows live between the
//! `DATE VALEUR` / `NATURE` header and the totals block, each starting with
//! two long dates hugging the left margin, and every amount is classified
//! debit or credit by comparing its x to the column midpoint. When the
//! statement exposes no header cells, the columns are recovered by
//! clustering the amount x positions.
//!
//! The text path covers raw-text input and documents whose geometry never
//! shows the table header: rows are re-found as pairs of long dates, and
//! sign falls back to the `*` marker and keyword hints.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use releve_pdf::{LineItem, PdfLine};

use crate::banks::{fold_upper, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{
    normalize_spaces, parse_amount_fr, parse_date_fr_long, AmountMatch, AMOUNT_ITEM_RE, AMOUNT_RE,
};
use crate::transaction::Transaction;

pub struct SocieteGenerale;

/// Row dates sit at the left margin; anything past this x is not a row
/// opener.
const ROW_DATE_MAX_X: f32 = 70.0;

/// Bucket width (in points) for the amount-column clustering fallback.
const CLUSTER_BUCKET: f32 = 5.0;

static LONG_DATE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("sg long date item regex"));

static DATE_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}/\d{2}/\d{4})\s+(\d{2}/\d{2}/\d{4})").expect("sg date pair regex")
});

const WINDOW_END_MARKERS: &[&str] = &["TOTAUX DES MOUVEMENTS", "NOUVEAU SOLDE"];

const CHUNK_STOP_MARKERS: &[&str] = &[
    "SUITE >>>",
    "N° ADEME",
    "RELEVE DE COMPTE",
    "SOCIETE GENERALE",
    "PAGE ",
];

const CREDIT_HINTS: &[&str] = &["REMISE CB", "VIR RECU", "REMISE CHEQUE"];

const DEBIT_HINTS: &[&str] = &[
    "PRELEVEMENT",
    "VRST GAB",
    "VIR EUROPEEN EMIS",
    "VIR INSTANTANE EMIS",
    "DEBIT",
    "COTIS",
    "FRAIS",
    "ECHEANCE",
    "CHEQUE ",
];

impl BankParser for SocieteGenerale {
    fn id(&self) -> &'static str {
        "societe-generale"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("SOCIETE GENERALE")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        match input {
            StatementInput::Pdf(bytes) => {
                let lines = releve_pdf::extract_positioned_lines(bytes)?;
                match parse_geometry(&lines) {
                    Err(ParseError::UnrecognizedFormat) => {
                        debug!("societe-generale: no table header, trying the text path");
                        let flat = releve_pdf::extract_flat_text(bytes)?;
                        parse_flat(&flat)
                    }
                    other => other,
                }
            }
            StatementInput::Text(text) => parse_flat(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry path
// ---------------------------------------------------------------------------

struct OpenRow<'a> {
    value_date: chrono::NaiveDate,
    operation_date: chrono::NaiveDate,
    /// `(x, magnitude)` of every amount item seen in the row.
    amounts: Vec<(f32, f64)>,
    label_parts: Vec<&'a str>,
    raw: String,
    page: usize,
}

fn parse_geometry(lines: &[PdfLine]) -> Result<Vec<Transaction>, ParseError> {
    // First pass: mark the table window(s) and grab the header column cells.
    let mut header_debit_x: Option<f32> = None;
    let mut header_credit_x: Option<f32> = None;
    let mut window_flags = vec![false; lines.len()];
    let mut in_window = false;
    let mut saw_window = false;

    for (i, line) in lines.iter().enumerate() {
        let folded = fold_upper(&line.text);
        if folded.contains("DATE VALEUR") && folded.contains("NATURE") {
            in_window = true;
            saw_window = true;
            for item in &line.items {
                let item_folded = fold_upper(&item.text);
                if item_folded.contains("DEBIT") {
                    header_debit_x = Some(item.x);
                } else if item_folded.contains("CREDIT") {
                    header_credit_x = Some(item.x);
                }
            }
            continue;
        }
        if in_window && WINDOW_END_MARKERS.iter().any(|m| folded.contains(m)) {
            in_window = false;
            continue;
        }
        window_flags[i] = in_window;
    }

    if !saw_window {
        return Err(ParseError::UnrecognizedFormat);
    }

    let (debit_x, credit_x) = match (header_debit_x, header_credit_x) {
        (Some(d), Some(c)) => (Some(d), Some(c)),
        _ => cluster_columns(lines, &window_flags),
    };

    // Second pass: assemble rows.
    let mut transactions: Vec<Transaction> = Vec::new();
    let mut open: Option<OpenRow> = None;

    for (i, line) in lines.iter().enumerate() {
        if !window_flags[i] {
            flush(&mut open, debit_x, credit_x, &mut transactions);
            continue;
        }

        let date_items: Vec<&LineItem> = line
            .items
            .iter()
            .filter(|item| LONG_DATE_ITEM_RE.is_match(item.text.trim()))
            .collect();

        let starts_row = date_items.len() >= 2
            && date_items[0].x < ROW_DATE_MAX_X
            && date_items[1].x < ROW_DATE_MAX_X;

        if starts_row {
            flush(&mut open, debit_x, credit_x, &mut transactions);
            let (Ok(value_date), Ok(operation_date)) = (
                parse_date_fr_long(date_items[0].text.trim()),
                parse_date_fr_long(date_items[1].text.trim()),
            ) else {
                debug!("societe-generale: dropped row {:?}", line.text);
                continue;
            };

            let mut row = OpenRow {
                value_date,
                operation_date,
                amounts: Vec::new(),
                label_parts: Vec::new(),
                raw: line.text.clone(),
                page: line.page,
            };
            collect_row_items(line, Some(date_items[1].x), &mut row);
            open = Some(row);
        } else if let Some(row) = open.as_mut() {
            row.raw.push('\n');
            row.raw.push_str(&line.text);
            collect_row_items(line, None, row);
        }
    }

    flush(&mut open, debit_x, credit_x, &mut transactions);
    Ok(transactions)
}

/// Sort a line's items into row amounts and label fragments. On the opening
/// line only items right of the operation date count as label text.
fn collect_row_items<'a>(line: &'a PdfLine, min_label_x: Option<f32>, row: &mut OpenRow<'a>) {
    for item in &line.items {
        let trimmed = item.text.trim();
        if LONG_DATE_ITEM_RE.is_match(trimmed) {
            continue;
        }
        if AMOUNT_ITEM_RE.is_match(trimmed) {
            if let Ok(value) = parse_amount_fr(trimmed) {
                row.amounts.push((item.x, value.abs()));
                continue;
            }
        }
        if min_label_x.is_none_or(|x| item.x > x) {
            row.label_parts.push(item.text.as_str());
        }
    }
}

/// Recover the debit/credit columns from the amount x distribution: 5-point
/// buckets, two densest win, larger x is the credit column.
fn cluster_columns(lines: &[PdfLine], window_flags: &[bool]) -> (Option<f32>, Option<f32>) {
    let mut buckets: BTreeMap<i64, usize> = BTreeMap::new();

    for (i, line) in lines.iter().enumerate() {
        if !window_flags[i] {
            continue;
        }
        for item in &line.items {
            if AMOUNT_ITEM_RE.is_match(item.text.trim()) {
                let key = ((item.x / CLUSTER_BUCKET).round() * CLUSTER_BUCKET) as i64;
                *buckets.entry(key).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(i64, usize)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

    match (ranked.first(), ranked.get(1)) {
        (Some(&(a, _)), Some(&(b, _))) => {
            let credit = a.max(b) as f32;
            let debit = a.min(b) as f32;
            (Some(debit), Some(credit))
        }
        _ => (None, None),
    }
}

fn flush(
    open: &mut Option<OpenRow>,
    debit_x: Option<f32>,
    credit_x: Option<f32>,
    transactions: &mut Vec<Transaction>,
) {
    let Some(row) = open.take() else {
        return;
    };
    if row.amounts.is_empty() {
        debug!("societe-generale: dropped row without amount {:?}", row.raw);
        return;
    }

    let amount = match (debit_x, credit_x) {
        (Some(dx), Some(cx)) => {
            let midpoint = (dx + cx) / 2.0;
            let signed: Vec<f64> = row
                .amounts
                .iter()
                .map(|&(x, magnitude)| if x >= midpoint { magnitude } else { -magnitude })
                .collect();
            // When both cells are filled the credit-column amount wins.
            signed
                .iter()
                .rev()
                .find(|a| **a > 0.0)
                .copied()
                .unwrap_or_else(|| *signed.last().unwrap())
        }
        _ => {
            let magnitude = row.amounts.last().unwrap().1;
            let folded = fold_upper(&row.raw);
            hint_sign(&folded) * magnitude
        }
    };

    let mut label = normalize_spaces(&row.label_parts.join(" "));
    if label.is_empty() {
        label = normalize_spaces(&row.raw);
    }

    transactions.push(Transaction {
        date_operation: row.operation_date,
        date_valeur: Some(row.value_date),
        label,
        amount,
        raw: Some(row.raw),
        page: Some(row.page),
        section: None,
    });
}

/// Keyword fallback when no column geometry applies: credit hints win,
/// debit hints and the `*` marker are debits, debit by default.
fn hint_sign(folded: &str) -> f64 {
    if CREDIT_HINTS.iter().any(|h| folded.contains(h)) {
        return 1.0;
    }
    if DEBIT_HINTS.iter().any(|h| folded.contains(h)) {
        return -1.0;
    }
    if folded.contains('*') {
        return -1.0;
    }
    -1.0
}

// ---------------------------------------------------------------------------
// Text path
// ---------------------------------------------------------------------------

fn parse_flat(text: &str) -> Result<Vec<Transaction>, ParseError> {
    let pairs: Vec<regex::Captures> = DATE_PAIR_RE.captures_iter(text).collect();
    if pairs.is_empty() {
        return Err(ParseError::UnrecognizedFormat);
    }

    let mut transactions = Vec::new();

    for (i, caps) in pairs.iter().enumerate() {
        let chunk_start = caps.get(0).unwrap().end();
        let mut chunk_end = pairs
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(text.len());
        for marker in CHUNK_STOP_MARKERS {
            if let Some(pos) = text[chunk_start..chunk_end].find(marker) {
                chunk_end = chunk_start + pos;
            }
        }
        let chunk = &text[chunk_start..chunk_end];

        let Some(amount_match) = rightmost_clean_amount(chunk) else {
            debug!("societe-generale: dropped chunk {:?}", chunk);
            continue;
        };

        let (Ok(value_date), Ok(operation_date)) =
            (parse_date_fr_long(&caps[1]), parse_date_fr_long(&caps[2]))
        else {
            continue;
        };

        let mut label = normalize_spaces(&chunk[..amount_match.start]);
        if label.is_empty() {
            label = normalize_spaces(chunk);
        }

        let folded = fold_upper(chunk);
        let sign = if folded.contains('*') {
            -1.0
        } else {
            hint_sign(&folded)
        };

        transactions.push(Transaction {
            date_operation: operation_date,
            date_valeur: Some(value_date),
            label,
            amount: sign * amount_match.value.abs(),
            raw: Some(chunk.trim().to_string()),
            page: None,
            section: None,
        });
    }

    Ok(transactions)
}

/// Rightmost amount whose left neighbour is not a digit.
///
/// The scan is overlap-tolerant: a match glued to a reference number is
/// rejected and the search resumes one character further in, so the clean
/// amount hiding inside it (`556677,001 234,00` -> `234,00`) is still found.
fn rightmost_clean_amount(chunk: &str) -> Option<AmountMatch> {
    let mut best: Option<AmountMatch> = None;
    let mut pos = 0;

    while let Some(m) = AMOUNT_RE.find_at(chunk, pos) {
        let glued = chunk[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit());
        if glued {
            pos = m.start() + 1;
            continue;
        }
        if let Ok(value) = parse_amount_fr(m.as_str()) {
            best = Some(AmountMatch {
                start: m.start(),
                end: m.end(),
                value,
            });
        }
        pos = m.end();
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

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
                ("DATE VALEUR", 30.0),
                ("NATURE DE L'OPERATION", 150.0),
                ("DEBIT", 400.0),
                ("CREDIT", 500.0),
            ],
        )
    }

    #[test]
    fn rows_inside_the_window_parse_with_column_signs() {
        let lines = vec![
            line(1, &[("RELEVE DE COMPTE", 30.0)]),
            header(),
            line(
                1,
                &[
                    ("02/06/2025", 30.0),
                    ("01/06/2025", 60.0),
                    ("PRELEVEMENT EUROPEEN ORANGE", 150.0),
                    ("29,99", 405.0),
                ],
            ),
            line(
                1,
                &[
                    ("05/06/2025", 30.0),
                    ("05/06/2025", 60.0),
                    ("VIR RECU SALAIRE", 150.0),
                    ("2 300,00", 495.0),
                ],
            ),
            line(1, &[("TOTAUX DES MOUVEMENTS", 30.0), ("2 329,99", 400.0)]),
        ];

        let txns = parse_geometry(&lines).unwrap();
        assert_eq!(txns.len(), 2);

        assert_eq!(txns[0].amount, -29.99);
        // First date is the value date, second the operation date.
        assert_eq!(
            txns[0].date_valeur,
            Some(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()),
        );
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        assert_eq!(txns[0].label, "PRELEVEMENT EUROPEEN ORANGE");

        assert_eq!(txns[1].amount, 2300.00);
    }

    #[test]
    fn credit_column_wins_when_both_cells_are_filled() {
        let lines = vec![
            header(),
            line(
                1,
                &[
                    ("02/06/2025", 30.0),
                    ("02/06/2025", 60.0),
                    ("ANNULATION ET REMISE", 150.0),
                    ("15,00", 405.0),
                    ("45,00", 495.0),
                ],
            ),
        ];

        let txns = parse_geometry(&lines).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 45.00);
    }

    #[test]
    fn continuation_lines_feed_label_and_amounts() {
        let lines = vec![
            header(),
            line(
                1,
                &[
                    ("02/06/2025", 30.0),
                    ("01/06/2025", 60.0),
                    ("CARTE X1234", 150.0),
                ],
            ),
            line(1, &[("REMBOURSEMENT JUIN", 150.0), ("18,50", 405.0)]),
        ];

        let txns = parse_geometry(&lines).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, -18.50);
        assert_eq!(txns[0].label, "CARTE X1234 REMBOURSEMENT JUIN");
    }

    #[test]
    fn columns_are_clustered_when_the_header_has_no_cells() {
        // Header without DEBIT/CREDIT items: the two densest amount x
        // buckets become the columns, the larger being credit.
        let lines = vec![
            line(
                1,
                &[("DATE VALEUR", 30.0), ("NATURE DE L'OPERATION", 150.0)],
            ),
            line(
                1,
                &[
                    ("02/06/2025", 30.0),
                    ("01/06/2025", 60.0),
                    ("FACTURE A", 150.0),
                    ("10,00", 405.0),
                ],
            ),
            line(
                1,
                &[
                    ("03/06/2025", 30.0),
                    ("02/06/2025", 60.0),
                    ("FACTURE B", 150.0),
                    ("20,00", 406.0),
                ],
            ),
            line(
                1,
                &[
                    ("04/06/2025", 30.0),
                    ("03/06/2025", 60.0),
                    ("VERSEMENT C", 150.0),
                    ("30,00", 495.0),
                ],
            ),
            line(
                1,
                &[
                    ("05/06/2025", 30.0),
                    ("04/06/2025", 60.0),
                    ("VERSEMENT D", 150.0),
                    ("40,00", 496.0),
                ],
            ),
        ];

        let txns = parse_geometry(&lines).unwrap();
        assert_eq!(txns.len(), 4);
        assert_eq!(txns[0].amount, -10.00);
        assert_eq!(txns[1].amount, -20.00);
        assert_eq!(txns[2].amount, 30.00);
        assert_eq!(txns[3].amount, 40.00);
    }

    #[test]
    fn missing_window_header_is_unrecognized() {
        let lines = vec![line(1, &[("RELEVE SANS TABLEAU", 30.0)])];
        assert!(matches!(
            parse_geometry(&lines),
            Err(ParseError::UnrecognizedFormat),
        ));
    }

    #[test]
    fn text_path_parses_date_pairs() {
        let text = "SOCIETE GENERALE RELEVE 02/06/2025 01/06/2025 \
PRELEVEMENT EUROPEEN ORANGE REF 556677 29,99 \
05/06/2025 05/06/2025 VIR RECU SALAIRE ACME 2 300,00 PAGE 2";

        let txns = parse_flat(text).unwrap();
        assert_eq!(txns.len(), 2);

        assert_eq!(txns[0].amount, -29.99);
        assert_eq!(
            txns[0].date_operation,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        assert!(txns[0].label.contains("PRELEVEMENT EUROPEEN ORANGE"));

        assert_eq!(txns[1].amount, 2300.00);
        assert!(txns[1].label.contains("VIR RECU SALAIRE"));
    }

    #[test]
    fn text_path_star_marker_means_debit() {
        let text = "02/06/2025 01/06/2025 CARTE X1234 RETRAIT * 50,00";
        let txns = parse_flat(text).unwrap();
        assert_eq!(txns[0].amount, -50.00);
    }

    #[test]
    fn text_path_skips_amounts_glued_to_references() {
        // `556677,00` must not be read as the row amount.
        let text = "02/06/2025 01/06/2025 VIR RECU REF 556677,001 234,00";
        let txns = parse_flat(text).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 234.00);
    }

    #[test]
    fn text_path_without_pairs_is_unrecognized() {
        assert!(matches!(
            parse_flat("SOCIETE GENERALE 01/06/2025 SEUL"),
            Err(ParseError::UnrecognizedFormat),
        ));
    }

    #[test]
    fn raw_text_input_uses_the_text_path() {
        let txns = SocieteGenerale
            .parse(StatementInput::Text(
                "02/06/2025 01/06/2025 VIR RECU LOYER 450,00",
            ))
            .unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 450.00);
    }

    #[test]
    fn detect_branding() {
        assert!(SocieteGenerale.detect("SOCIETE GENERALE"));
        assert!(!SocieteGenerale.detect("CIC"));
    }
}
