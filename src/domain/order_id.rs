//! Identifier issuance. Order IDs bound a logical payment attempt; transaction and
//! refund IDs are assigned by the service and never accepted from callers.

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_ORDER_ID_LENGTH: usize = 64;

const ORDER_PREFIX: &str = "ord";
const TRANSACTION_PREFIX: &str = "txn";
const REFUND_PREFIX: &str = "rfnd";

pub fn issue_order_id() -> String {
    issue(ORDER_PREFIX)
}

pub fn issue_transaction_id() -> String {
    issue(TRANSACTION_PREFIX)
}

pub fn issue_refund_id() -> String {
    issue(REFUND_PREFIX)
}

/// `<prefix>_<unix millis>_<16 hex chars>`: sortable by issue time, collision resistant,
/// and carries nothing about the payer.
fn issue(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), &random[..16])
}

/// Accepts a caller-supplied order ID.
pub fn normalize_order_id(raw: &str) -> Result<String, AppError> {
    let id = raw.trim();

    if id.is_empty() {
        return Err(AppError::InvalidRequest("orderId must not be empty".into()));
    }

    if id.len() > MAX_ORDER_ID_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "orderId must not exceed {} characters",
            MAX_ORDER_ID_LENGTH
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(AppError::InvalidRequest(
            "orderId may only contain letters, digits, '_', '-', '.' and ':'".into(),
        ));
    }

    Ok(id.to_string())
}
