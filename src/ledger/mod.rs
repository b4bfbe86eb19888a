pub mod memory;

use crate::domain::models::{Currency, Transaction};
use std::collections::BTreeSet;
use std::future::Future;

/// Periods of a fund settled by one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction_id: String,
    pub user_id: String,
    pub fund_id: String,
    pub periods: BTreeSet<u32>,
    pub amount_minor_units: i64,
    pub currency: Currency,
}

impl From<&Transaction> for LedgerEntry {
    fn from(txn: &Transaction) -> Self {
        Self {
            transaction_id: txn.transaction_id.clone(),
            user_id: txn.user_id.clone(),
            fund_id: txn.fund_id.clone(),
            periods: txn.periods.clone(),
            amount_minor_units: txn.amount_minor_units,
            currency: txn.currency,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerApplied {
    Applied,
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// The entry itself is unacceptable; retrying it unchanged will not help.
    #[error("ledger rejected entry: {0}")]
    Rejected(String),
}

/// Bookkeeping of paid fund periods.
///
/// Implementations must apply an entry at most once per `transaction_id`; a repeated
/// entry reports `AlreadyApplied` and changes nothing.
pub trait LedgerUpdater: Clone + Send + Sync + 'static {
    fn mark_periods_paid(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = Result<LedgerApplied, LedgerError>> + Send;
}
