//! Pure running-balance arithmetic for the ledger engine.
//!
//! A contact's balance is the signed fold of its entries:
//! `balance = prior + debit - credit` (positive: the contact owes us).
//! Reversal is modeled as a replay over the ordered entry stream; the replay
//! is a pure function here so its idempotence can be tested directly.

use rust_decimal::Decimal;

/// Debit/credit amounts of one entry, in stream order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryDelta {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Balance after applying one entry to a prior balance
pub fn entry_balance(prior: Decimal, debit: Decimal, credit: Decimal) -> Decimal {
    prior + debit - credit
}

/// Replay an ordered entry stream from an opening balance, returning the
/// running balance after each entry. Replaying the same stream twice always
/// yields the same result.
pub fn replay_balances(opening: Decimal, entries: &[EntryDelta]) -> Vec<Decimal> {
    let mut balances = Vec::with_capacity(entries.len());
    let mut balance = opening;
    for entry in entries {
        balance = entry_balance(balance, entry.debit, entry.credit);
        balances.push(balance);
    }
    balances
}

/// Auto-payment rule: an invoice is immediately `paid` when the contact's
/// balance before the invoice entry already represents credit covering the
/// total (`balance <= -total`).
pub fn covers_invoice(prior_balance: Decimal, invoice_total: Decimal) -> bool {
    invoice_total > Decimal::ZERO && prior_balance <= -invoice_total
}
