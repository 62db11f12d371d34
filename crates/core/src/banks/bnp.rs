//! BNP Paribas statement parser (text-based).
//!
//! BNP statements flatten well: every row carries its operation date in
//! `dd.mm.yy` form, the label, the value date, then the debit or credit
//! amount. The parser slices the table between its header marker and the
//! totals block, re-inserts line breaks in front of each row date and each
//! boilerplate fragment, then walks the rows with a section tracker that
//! drives sign inference.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::banks::{flat_text_of, fold_upper, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{
    find_amounts_in_line, is_uppercase_title, normalize_spaces, parse_date_fr, AmountMatch,
    DATE_DOT_RE,
};
use crate::transaction::Transaction;

pub struct Bnp;

static TABLE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DATE\s*COMPTABLE").expect("bnp table start regex"));

/// The table ends at the first totals or balance marker.
const TABLE_END_MARKERS: &[&str] = &[
    "TOTAL DES OPERATIONS",
    "SOLDE CREDITEUR",
    "SOLDE DÉBITEUR",
    "SOLDE AU",
    "ANCIEN SOLDE",
];

/// Section headings that group rows and hint at their sign.
const SECTION_KEYWORDS: &[&str] = &[
    "VIREMENTS RECUS",
    "VIREMENTS EMIS",
    "PRELEVEMENTS, AMORTISSEMENTS DE PRETS",
    "AUTRES OPERATIONS DEBIT",
    "REMISES DE CARTES",
    "CHEQUES EMIS",
    "PAIEMENTS PAR CARTES",
];

/// Boilerplate fragments that must start their own line and be skipped.
const BOILERPLATE: &[&str] = &["SOUS-TOTAL", "SOUS TOTAL", "SOLDE", "TOTAL DES OPERATIONS"];

static PAGE_MARK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"P\. ?\d+/\d+").expect("bnp page marker regex"));

/// A row starts with its operation date.
static ROW_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{2}\s").expect("bnp row start regex"));

/// Break before every `dd.mm.yy` that is followed by a label letter (value
/// dates are followed by the amount and stay inline).
static ROW_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}\.\d{2}\.\d{2}\s+[A-Za-zÀ-ÿ])").expect("bnp row break regex")
});

/// Split a raw line into columns when it kept its columnar spacing.
static COLUMN_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("bnp column split regex"));

static COLUMN_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}$", crate::lexical::AMOUNT_PATTERN)).expect("bnp column amount regex")
});

const CREDIT_HINTS: &[&str] = &[
    "RECUS",
    "CREDIT",
    "VERSEMENT",
    "REMISE",
    "INTERETS",
    "REMBOURSEMENT",
];

const DEBIT_HINTS: &[&str] = &[
    "EMIS",
    "PRELEVEMENTS",
    "DEBIT",
    "AMORTISSEMENTS",
    "FRAIS",
    "CARTE",
    "RETRAIT",
    "CHEQUES EMIS",
    "PAIEMENTS PAR CARTES",
];

/// Sections whose rows are debits no matter what the line says.
const FORCE_DEBIT_SECTIONS: &[&str] = &[
    "CHEQUES",
    "PAIEMENTS PAR CARTES",
    "PRELEVEMENTS",
    "VIREMENTS EMIS",
    "AUTRES OPERATIONS DEBIT",
];

/// Sections whose rows are credits no matter what the line says.
const FORCE_CREDIT_SECTIONS: &[&str] = &["REMISES DE CARTES", "VIREMENTS RECUS"];

impl BankParser for Bnp {
    fn id(&self) -> &'static str {
        "bnp"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("BNP PARIBAS")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        let text = flat_text_of(input)?;
        parse_text(&text)
    }
}

fn parse_text(text: &str) -> Result<Vec<Transaction>, ParseError> {
    let table = slice_table(text)?;
    let lines = resegment(table);

    let mut transactions: Vec<Transaction> = Vec::new();
    let mut section: Option<String> = None;
    let mut open: Option<OpenRow> = None;

    for line in lines {
        if is_boilerplate(&line) {
            flush(&mut open, &mut transactions);
            continue;
        }

        if let Some(heading) = known_section_of(&line) {
            flush(&mut open, &mut transactions);
            section = Some(heading);
            continue;
        }

        if ROW_START_RE.is_match(&line) {
            flush(&mut open, &mut transactions);
            open = Some(OpenRow {
                line,
                continuation: Vec::new(),
                section: section.clone(),
            });
            continue;
        }

        if let Some(row) = open.as_mut() {
            row.continuation.push(line);
            continue;
        }

        // Outside any row, an uppercase title without a date token opens a
        // section of its own.
        if is_uppercase_title(&line) && !DATE_DOT_RE.is_match(&line) {
            section = Some(normalize_spaces(&line));
        }
    }

    flush(&mut open, &mut transactions);
    Ok(transactions)
}

fn slice_table(text: &str) -> Result<&str, ParseError> {
    let start = TABLE_START_RE
        .find(text)
        .ok_or(ParseError::UnrecognizedFormat)?;
    let rest = &text[start.end()..];

    let end = TABLE_END_MARKERS
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());

    Ok(&rest[..end])
}

/// Re-insert the line structure the flat extraction lost: a break before
/// every row date, every section heading and every boilerplate fragment.
/// Lines are trimmed but keep their internal spacing so the columnar amount
/// strategy still sees wide gaps when the source had them.
fn resegment(table: &str) -> Vec<String> {
    let mut text = table.replace('\u{A0}', " ");

    for keyword in SECTION_KEYWORDS.iter().chain(BOILERPLATE) {
        text = text.replace(keyword, &format!("\n{keyword}"));
    }
    text = PAGE_MARK_RE.replace_all(&text, "\n$0").into_owned();
    text = ROW_BREAK_RE.replace_all(&text, "\n$1").into_owned();

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_boilerplate(line: &str) -> bool {
    BOILERPLATE.iter().any(|b| line.starts_with(b)) || PAGE_MARK_RE.is_match(line)
}

fn known_section_of(line: &str) -> Option<String> {
    let folded = fold_upper(line);
    SECTION_KEYWORDS
        .iter()
        .find(|k| folded.contains(*k))
        .map(|k| (*k).to_string())
}

struct OpenRow {
    line: String,
    continuation: Vec<String>,
    section: Option<String>,
}

fn flush(open: &mut Option<OpenRow>, transactions: &mut Vec<Transaction>) {
    if let Some(row) = open.take() {
        match build_transaction(&row) {
            Some(txn) => transactions.push(txn),
            None => debug!("bnp: dropped row {:?}", row.line),
        }
    }
}

fn build_transaction(row: &OpenRow) -> Option<Transaction> {
    let line = row.line.as_str();

    let dates: Vec<regex::Match> = DATE_DOT_RE.find_iter(line).collect();
    let first = dates.first()?;
    let date_operation = parse_date_fr(first.as_str()).ok()?;
    let date_valeur = dates.get(1).and_then(|m| parse_date_fr(m.as_str()).ok());

    let amounts = extract_amounts(line, &dates);
    let amount = resolve_sign(&amounts, line, row.section.as_deref())?;

    let mut label = match dates.get(1) {
        Some(second) => normalize_spaces(&line[first.end()..second.start()]),
        None => {
            // No value date: everything after the operation date, minus any
            // date tokens.
            let tail = &line[first.end()..];
            normalize_spaces(&DATE_DOT_RE.replace_all(tail, " "))
        }
    };
    for extra in &row.continuation {
        let extra = normalize_spaces(extra);
        if !extra.is_empty() {
            if !label.is_empty() {
                label.push(' ');
            }
            label.push_str(&extra);
        }
    }
    if label.is_empty() {
        label = normalize_spaces(line);
    }

    let mut raw = row.line.clone();
    for extra in &row.continuation {
        raw.push('\n');
        raw.push_str(extra);
    }

    Some(Transaction {
        date_operation,
        date_valeur,
        label,
        amount,
        raw: Some(raw),
        page: None,
        section: row.section.clone(),
    })
}

/// Amount extraction strategies, in order:
/// (a) columnar split on runs of two or more spaces, columns 3-4 being the
///     debit/credit cells;
/// (b) every amount on the line once date tokens are blanked out;
/// (c) amounts appearing after the value-date token.
fn extract_amounts(line: &str, dates: &[regex::Match]) -> Vec<f64> {
    let columns: Vec<&str> = COLUMN_SPLIT_RE.split(line).collect();
    if columns.len() > 3 {
        let cells: Vec<f64> = columns[3..=4.min(columns.len() - 1)]
            .iter()
            .filter(|cell| COLUMN_AMOUNT_RE.is_match(cell.trim()))
            .filter_map(|cell| crate::lexical::parse_amount_fr(cell).ok())
            .collect();
        if !cells.is_empty() {
            return cells;
        }
    }

    let mut blanked = line.to_string();
    for date in dates {
        blanked.replace_range(date.range(), &" ".repeat(date.len()));
    }
    let found: Vec<f64> = find_amounts_in_line(&blanked)
        .iter()
        .map(|m: &AmountMatch| m.value)
        .collect();
    if !found.is_empty() {
        return found;
    }

    if let Some(value_date) = dates.get(1) {
        return find_amounts_in_line(&line[value_date.end()..])
            .iter()
            .map(|m| m.value)
            .collect();
    }

    Vec::new()
}

/// Turn the extracted amounts into one signed row amount.
///
/// Two amounts mean the row filled both the debit and the credit cell; the
/// credit (last) value wins and the debit assignment is discarded. A single
/// amount is signed by keyword hints, section hints taking precedence over
/// line hints. The section override then has the final word.
fn resolve_sign(amounts: &[f64], line: &str, section: Option<&str>) -> Option<f64> {
    let initial = match amounts {
        [] => return None,
        [single] => infer_sign(*single, line, section),
        [.., credit] => credit.abs(),
    };
    Some(apply_section_override(initial, section))
}

fn infer_sign(value: f64, line: &str, section: Option<&str>) -> f64 {
    let magnitude = value.abs();

    if let Some(section) = section {
        let folded = fold_upper(section);
        if CREDIT_HINTS.iter().any(|h| folded.contains(h)) {
            return magnitude;
        }
        if DEBIT_HINTS.iter().any(|h| folded.contains(h)) {
            return -magnitude;
        }
    }

    let folded = fold_upper(line);
    if CREDIT_HINTS.iter().any(|h| folded.contains(h)) {
        return magnitude;
    }
    if DEBIT_HINTS.iter().any(|h| folded.contains(h)) {
        return -magnitude;
    }

    -magnitude
}

fn apply_section_override(amount: f64, section: Option<&str>) -> f64 {
    if let Some(section) = section {
        let folded = fold_upper(section);
        if FORCE_CREDIT_SECTIONS.iter().any(|s| folded.contains(s)) {
            return amount.abs();
        }
        if FORCE_DEBIT_SECTIONS.iter().any(|s| folded.contains(s)) {
            return -amount.abs();
        }
    }
    amount
}
