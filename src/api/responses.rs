use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::models::{Currency, RefundRecord, Transaction, TransactionStatus};
use crate::domain::service::ChargeReceipt;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeView {
    pub transaction_id: String,
    pub order_id: String,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub replayed: bool,
}

impl From<ChargeReceipt> for ChargeView {
    fn from(receipt: ChargeReceipt) -> Self {
        let txn = receipt.transaction;
        Self {
            transaction_id: txn.transaction_id,
            order_id: txn.order_id,
            amount_minor_units: txn.amount_minor_units,
            currency: txn.currency,
            status: txn.status,
            replayed: receipt.replayed,
        }
    }
}

/// Public projection of a transaction. Gateway references stay server-side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: String,
    pub order_id: String,
    pub user_id: String,
    pub fund_id: String,
    pub periods: Vec<u32>,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub ledger_synced: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(txn: Transaction) -> Self {
        Self {
            ledger_synced: txn.ledger_synced_at.is_some(),
            transaction_id: txn.transaction_id,
            order_id: txn.order_id,
            user_id: txn.user_id,
            fund_id: txn.fund_id,
            periods: txn.periods.into_iter().collect(),
            amount_minor_units: txn.amount_minor_units,
            currency: txn.currency,
            status: txn.status,
            failure_reason: txn.failure_reason,
            created_at: txn.created_at,
            updated_at: txn.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionBody {
    pub transaction: TransactionView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryBody {
    pub user_id: String,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundView {
    pub refund_id: String,
    pub transaction_id: String,
    pub amount_minor_units: i64,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RefundRecord> for RefundView {
    fn from(record: RefundRecord) -> Self {
        Self {
            refund_id: record.refund_id,
            transaction_id: record.original_transaction_id,
            amount_minor_units: record.amount_minor_units,
            currency: record.currency,
            reason: record.reason,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefundsBody {
    pub refunds: Vec<RefundView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIdView {
    pub order_id: String,
}
