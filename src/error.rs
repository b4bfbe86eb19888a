use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::domain::models::{Transaction, TransactionStatus};

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Payment for order {order_id} is already in progress")]
    ConflictInProgress { order_id: String },

    #[error("Outcome of transaction {} is not yet known", .transaction.transaction_id)]
    Indeterminate { transaction: Box<Transaction> },

    #[error("Payment declined: {}", .transaction.failure_reason.as_deref().unwrap_or("declined by gateway"))]
    GatewayDeclined { transaction: Box<Transaction> },

    #[error("Refund declined: {0}")]
    RefundDeclined(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Transaction {transaction_id} is {status} and cannot be {action}")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
        action: &'static str,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Ledger update failed for transaction {}: {reason}", .transaction.transaction_id)]
    LedgerSyncFailed {
        transaction: Box<Transaction>,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::GatewayDeclined { .. }
            | AppError::RefundDeclined(_)
            | AppError::InvalidState { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConflictInProgress { .. } | AppError::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Indeterminate { .. } | AppError::LedgerSyncFailed { .. } => {
                StatusCode::ACCEPTED
            }
            AppError::StoreUnavailable(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::NotFound(_) => json!({
                "success": false,
                "error": "Transaction not found",
            }),
            AppError::ConflictInProgress { order_id } => json!({
                "success": false,
                "error": self.to_string(),
                "orderId": order_id,
            }),
            AppError::Indeterminate { transaction } => json!({
                "success": false,
                "error": "Payment outcome not yet known; poll the transaction instead of retrying",
                "transactionId": transaction.transaction_id,
                "orderId": transaction.order_id,
                "status": transaction.status,
            }),
            AppError::GatewayDeclined { transaction } => json!({
                "success": false,
                "error": self.to_string(),
                "transactionId": transaction.transaction_id,
                "orderId": transaction.order_id,
                "status": transaction.status,
            }),
            AppError::LedgerSyncFailed { transaction, .. } => json!({
                "success": true,
                "transactionId": transaction.transaction_id,
                "orderId": transaction.order_id,
                "amountMinorUnits": transaction.amount_minor_units,
                "currency": transaction.currency,
                "status": transaction.status,
                "ledgerSynced": false,
                "error": "Payment captured; ledger update pending reconciliation",
            }),
            AppError::StoreUnavailable(_) | AppError::Internal(_) => json!({
                "success": false,
                "error": INTERNAL_MESSAGE,
            }),
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::StoreUnavailable(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
            }
            AppError::LedgerSyncFailed { .. } => {
                tracing::error!(error = %self, "payment captured without ledger update");
            }
            _ => tracing::debug!(error = %self, status = status.as_u16(), "request rejected"),
        }

        (status, axum::Json(self.body())).into_response()
    }
}
