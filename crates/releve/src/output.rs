//! Rendering of the parsed transaction list: terminal table, JSON, CSV.
//!
//! The CSV keeps the spreadsheet builder's column order (DATE, VALEUR,
//! LIBELLE, DEBIT, CREDIT) and the totals row is accumulated in integer
//! cents, never by summing floats.

use chrono::NaiveDate;
use prettytable::row;
use releve_core::{to_cents, totals_cents, Transaction};

use crate::prelude::*;
use crate::prelude::println;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

pub fn render(transactions: &[Transaction], format: Format) -> Result<()> {
    match format {
        Format::Table => render_table(transactions),
        Format::Json => println!("{}", serde_json::to_string_pretty(transactions)?),
        Format::Csv => render_csv(transactions),
    }

    Ok(())
}

fn render_table(transactions: &[Transaction]) {
    let mut table = new_table();
    table.set_titles(row!["DATE", "VALEUR", "LIBELLE", "DEBIT", "CREDIT"]);

    for txn in transactions {
        let (debit, credit) = split_amount(txn);
        table.add_row(row![
            format_date(Some(txn.date_operation)),
            format_date(txn.date_valeur),
            txn.label,
            r -> debit,
            r -> credit
        ]);
    }

    let totals = totals_cents(transactions);
    table.add_row(row![
        "",
        "",
        "TOTAL",
        r -> format_cents(totals.debit_cents),
        r -> format_cents(totals.credit_cents)
    ]);

    table.printstd();
}

fn render_csv(transactions: &[Transaction]) {
    println!("DATE;VALEUR;LIBELLE;DEBIT;CREDIT");
    for txn in transactions {
        let (debit, credit) = split_amount(txn);
        println!(
            "{};{};{};{};{}",
            format_date(Some(txn.date_operation)),
            format_date(txn.date_valeur),
            csv_field(&txn.label),
            debit,
            credit,
        );
    }
}

/// Route the signed amount into its debit or credit cell, formatted in
/// French style from integer cents.
fn split_amount(txn: &Transaction) -> (String, String) {
    let formatted = format_cents(to_cents(txn.amount));
    if txn.amount < 0.0 {
        (formatted, String::new())
    } else {
        (String::new(), formatted)
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

/// `123456` cents -> `1 234,56`.
fn format_cents(cents: i64) -> String {
    let euros = cents / 100;
    let fraction = (cents % 100).abs();

    let digits = euros.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }

    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}{grouped},{fraction:02}")
}

fn csv_field(value: &str) -> String {
    if value.contains([';', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
