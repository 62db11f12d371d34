//! The canonical output record of every statement parser.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One accounting row of a statement, normalized across banks.
///
/// `amount` is signed from the account's perspective: positive for credits
/// (money in), negative for debits (money out), two fractional digits of EUR
/// by construction. The optional metadata fields keep enough provenance for
/// diagnostics without affecting equality of the accounting triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date_operation: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_valeur: Option<NaiveDate>,
    pub label: String,
    pub amount: f64,
    /// Raw source line(s) the row was assembled from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Statement section heading the row was found under, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Transaction {
    pub fn new(date_operation: NaiveDate, label: impl Into<String>, amount: f64) -> Self {
        Transaction {
            date_operation,
            date_valeur: None,
            label: label.into(),
            amount,
            raw: None,
            page: None,
            section: None,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0.0
    }
}

/// Credit and debit sums in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Totals {
    pub credit_cents: i64,
    pub debit_cents: i64,
}

impl Totals {
    pub fn credit_eur(&self) -> f64 {
        self.credit_cents as f64 / 100.0
    }

    pub fn debit_eur(&self) -> f64 {
        self.debit_cents as f64 / 100.0
    }
}

/// An amount's magnitude in integer cents.
pub fn to_cents(amount: f64) -> i64 {
    (amount.abs() * 100.0).round() as i64
}

/// Accumulate credit and debit totals in integer cents.
///
/// This is the accumulation rule the downstream spreadsheet builder must
/// share; summing the f64 amounts directly drifts over long statements.
pub fn totals_cents(transactions: &[Transaction]) -> Totals {
    let mut totals = Totals::default();
    for txn in transactions {
        if txn.amount >= 0.0 {
            totals.credit_cents += to_cents(txn.amount);
        } else {
            totals.debit_cents += to_cents(txn.amount);
        }
    }
    totals
}
