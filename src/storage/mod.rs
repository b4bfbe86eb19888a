pub mod memory;

#[cfg(test)]
pub(crate) mod faulty;

use crate::domain::models::{RefundRecord, Reservation, Transaction, Transition};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use std::future::Future;

/// System of record for transactions and refunds.
///
/// `reserve` is the only operation that must be atomic across callers: it inserts the
/// record unless one with the same order ID exists. Status changes go through
/// `transition`, a compare-and-set on the current status.
pub trait Storage: Clone + Send + Sync + 'static {
    fn reserve(
        &self,
        txn: Transaction,
    ) -> impl Future<Output = Result<Reservation, AppError>> + Send;

    fn get(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, AppError>> + Send;

    fn find_by_order_id(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, AppError>> + Send;

    /// Transactions for `user_id`, newest first.
    fn history(
        &self,
        user_id: &str,
        fund_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Transaction>, AppError>> + Send;

    fn transition(
        &self,
        transaction_id: &str,
        transition: Transition,
    ) -> impl Future<Output = Result<Transaction, AppError>> + Send;

    /// Records that the ledger has been updated. Keeps the first timestamp if called again.
    fn mark_ledger_synced(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Transaction, AppError>> + Send;

    /// Claims the single refund slot of a transaction. Returns false if already held.
    fn claim_refund(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn release_refund(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Moves the transaction from `SUCCEEDED` to `REFUNDED` and stores `record` in one
    /// atomic write. Repeating a call whose record is already stored returns the
    /// transaction unchanged, so a lost acknowledgement can be retried.
    fn complete_refund(
        &self,
        record: RefundRecord,
    ) -> impl Future<Output = Result<Transaction, AppError>> + Send;

    fn refunds_for(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<Vec<RefundRecord>, AppError>> + Send;
}
