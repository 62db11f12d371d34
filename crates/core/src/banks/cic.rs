//! CIC statement parser (geometry-based).
//!
//! CIC rows carry two long dates (operation, value) and put the amount in
//! either the debit or the credit column; the sign is decided by comparing
//! the amount's x to the midpoint of the two header cells. The embedded
//! card-statement section is skipped wholesale, and the institutional
//! prelude is filtered out line by line.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use releve_pdf::{LineItem, PdfLine};

use crate::banks::{fold_upper, positioned_lines_of, BankParser, StatementInput};
use crate::error::ParseError;
use crate::lexical::{
    normalize_spaces, parse_amount_fr, parse_date_fr_long, AMOUNT_ITEM_RE, AMOUNT_RE,
    DATE_LONG_RE,
};
use crate::transaction::Transaction;

pub struct Cic;

/// Column midpoint used when the statement never shows an explicit
/// `DATE / DEBIT / CREDIT` header.
const DEFAULT_COLUMN_MIDPOINT: f32 = 455.0;

static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPAGE \d+").expect("cic page regex"));

/// Institutional prelude and totals noise, matched on folded text.
const NOISE_MARKERS: &[&str] = &[
    "RELEVE ET INFORMATIONS BANCAIRES",
    "CREDIT INDUSTRIEL ET COMMERCIAL",
    "CIC ",
    "VOTRE CONSEILLER",
    "C/C ",
    "KV.",
    "IBAN",
    "BIC",
    "SOLDE ",
    "TOTAL DES MOUVEMENTS",
    "TOTAL PRELEVE ",
    "DATE DATE VALEUR",
    "DATE COMMERCE VILLE",
];

impl BankParser for Cic {
    fn id(&self) -> &'static str {
        "cic"
    }

    fn detect(&self, flat_text: &str) -> bool {
        flat_text.contains("CREDIT INDUSTRIEL ET COMMERCIAL") || flat_text.contains("CIC")
    }

    fn parse(&self, input: StatementInput<'_>) -> Result<Vec<Transaction>, ParseError> {
        let lines = positioned_lines_of(input)?;
        parse_lines(&lines)
    }
}

struct OpenRow {
    transaction: Transaction,
}

fn parse_lines(lines: &[PdfLine]) -> Result<Vec<Transaction>, ParseError> {
    let mut debit_x: Option<f32> = None;
    let mut credit_x: Option<f32> = None;
    let mut skipping_card_section = false;

    let mut transactions: Vec<Transaction> = Vec::new();
    let mut open: Option<OpenRow> = None;

    for line in lines {
        let folded = fold_upper(&line.text);

        if folded.contains("RELEVE DE VOTRE CARTE") {
            flush(&mut open, &mut transactions);
            skipping_card_section = true;
            continue;
        }

        if is_column_header(&folded) {
            flush(&mut open, &mut transactions);
            skipping_card_section = false;
            for item in &line.items {
                let item_folded = fold_upper(&item.text);
                if item_folded.contains("DEBIT") {
                    debit_x = Some(item.x);
                } else if item_folded.contains("CREDIT") {
                    credit_x = Some(item.x);
                }
            }
            continue;
        }

        if skipping_card_section || is_noise(&folded) {
            continue;
        }

        let dates: Vec<regex::Match> = DATE_LONG_RE.find_iter(&line.text).collect();
        let amount_items: Vec<&LineItem> = line
            .items
            .iter()
            .filter(|i| AMOUNT_ITEM_RE.is_match(i.text.trim()))
            .collect();

        if dates.len() >= 2 && !amount_items.is_empty() {
            flush(&mut open, &mut transactions);
            match start_row(line, &dates, &amount_items, debit_x, credit_x) {
                Some(row) => open = Some(row),
                None => debug!("cic: dropped row {:?}", line.text),
            }
        } else if let Some(row) = open.as_mut() {
            let extra = normalize_spaces(&line.text);
            if !extra.is_empty() {
                row.transaction.label.push(' ');
                row.transaction.label.push_str(&extra);
                if let Some(raw) = row.transaction.raw.as_mut() {
                    raw.push('\n');
                    raw.push_str(&line.text);
                }
            }
        }
    }

    flush(&mut open, &mut transactions);

    if transactions.is_empty() {
        return Err(ParseError::UnrecognizedFormat);
    }
    Ok(transactions)
}

fn is_column_header(folded: &str) -> bool {
    folded.contains("DATE") && folded.contains("DEBIT") && folded.contains("CREDIT")
}

fn is_noise(folded: &str) -> bool {
    NOISE_MARKERS.iter().any(|m| folded.contains(m)) || PAGE_RE.is_match(folded)
}

fn start_row(
    line: &PdfLine,
    dates: &[regex::Match],
    amount_items: &[&LineItem],
    debit_x: Option<f32>,
    credit_x: Option<f32>,
) -> Option<OpenRow> {
    let date_operation = parse_date_fr_long(dates[0].as_str()).ok()?;
    let date_valeur = parse_date_fr_long(dates[1].as_str()).ok();

    let amount_item = *amount_items.last()?;
    let magnitude = parse_amount_fr(amount_item.text.trim()).ok()?.abs();

    let midpoint = match (debit_x, credit_x) {
        (Some(dx), Some(cx)) => (dx + cx) / 2.0,
        _ => DEFAULT_COLUMN_MIDPOINT,
    };
    let amount = if amount_item.x >= midpoint {
        magnitude
    } else {
        -magnitude
    };

    // The label sits between the second date and the amount cell.
    let date_items: Vec<&LineItem> = line
        .items
        .iter()
        .filter(|i| DATE_LONG_RE.is_match(i.text.trim()))
        .collect();
    let label = match date_items.get(1) {
        Some(second_date) => {
            let parts: Vec<&str> = line
                .items
                .iter()
                .filter(|i| i.x > second_date.x && i.x < amount_item.x)
                .map(|i| i.text.as_str())
                .collect();
            normalize_spaces(&parts.join(" "))
        }
        None => String::new(),
    };
    let label = if label.is_empty() {
        // The dates shared an item with the label; strip them and the
        // amount from the flat text instead.
        let mut text = line.text.clone();
        for date in dates.iter().take(2).rev() {
            text.replace_range(date.range(), " ");
        }
        let text = AMOUNT_RE.replace_all(&text, " ");
        normalize_spaces(&text)
    } else {
        label
    };
    let label = if label.is_empty() {
        normalize_spaces(&line.text)
    } else {
        label
    };

    Some(OpenRow {
        transaction: Transaction {
            date_operation,
            date_valeur,
            label,
            amount,
            raw: Some(line.text.clone()),
            page: Some(line.page),
            section: None,
        },
    })
}

fn flush(open: &mut Option<OpenRow>, transactions: &mut Vec<Transaction>) {
    if let Some(row) = open.take() {
        transactions.push(row.transaction);
    }
}
