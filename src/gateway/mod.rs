pub mod sandbox;

use crate::domain::models::{Currency, PaymentToken};
use std::future::Future;

#[derive(Debug, Clone)]
pub struct GatewayCharge {
    /// Order ID; lets the gateway and later reconciliation recognise the same attempt.
    pub idempotency_key: String,
    pub token: PaymentToken,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub idempotency_key: String,
    pub gateway_reference: String,
    pub amount_minor_units: i64,
    pub currency: Currency,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The gateway answered and refused. `reference` is whatever id it assigned.
    #[error("declined: {reason}")]
    Declined {
        reference: Option<String>,
        reason: String,
    },

    /// No usable answer; the operation may or may not have happened.
    #[error("outcome unknown: {0}")]
    Indeterminate(String),
}

/// External payment processor. Treated as untrusted and possibly slow.
pub trait PaymentGateway: Clone + Send + Sync + 'static {
    fn charge(
        &self,
        req: GatewayCharge,
    ) -> impl Future<Output = Result<GatewayReceipt, GatewayError>> + Send;

    fn refund(
        &self,
        req: GatewayRefund,
    ) -> impl Future<Output = Result<GatewayReceipt, GatewayError>> + Send;
}
