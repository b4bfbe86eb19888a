use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::gateway::{GatewayCharge, GatewayError, GatewayReceipt, GatewayRefund, PaymentGateway};

pub const DECLINE_PREFIX: &str = "tok_decline";
pub const INDETERMINATE_PREFIX: &str = "tok_indeterminate";
pub const SLOW_PREFIX: &str = "tok_slow";

/// Token-driven stand-in for a real processor. Tokens beginning with `tok_decline`
/// are declined, `tok_indeterminate` produce no usable answer, `tok_slow` succeed after
/// `slow_for`. Anything else succeeds.
#[derive(Debug, Clone)]
pub struct SandboxGateway {
    latency: Duration,
    slow_for: Duration,
    decline_refunds: bool,
    charges: Arc<AtomicUsize>,
    refunds: Arc<AtomicUsize>,
}

impl Default for SandboxGateway {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            slow_for: Duration::from_secs(2),
            decline_refunds: false,
            charges: Arc::default(),
            refunds: Arc::default(),
        }
    }
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_slow_for(mut self, slow_for: Duration) -> Self {
        self.slow_for = slow_for;
        self
    }

    pub fn declining_refunds(mut self) -> Self {
        self.decline_refunds = true;
        self
    }

    pub fn charge_calls(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    pub fn refund_calls(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }

    fn reference(prefix: &str) -> String {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }
}

impl PaymentGateway for SandboxGateway {
    async fn charge(&self, req: GatewayCharge) -> Result<GatewayReceipt, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let token = req.token.expose();
        if token.starts_with(DECLINE_PREFIX) {
            return Err(GatewayError::Declined {
                reference: Some(Self::reference("pay")),
                reason: "card declined by issuer".into(),
            });
        }
        if token.starts_with(INDETERMINATE_PREFIX) {
            return Err(GatewayError::Indeterminate("upstream timed out".into()));
        }
        if token.starts_with(SLOW_PREFIX) {
            tokio::time::sleep(self.slow_for).await;
        }

        tracing::debug!(
            order_id = %req.idempotency_key,
            amount = req.amount_minor_units,
            currency = %req.currency,
            "sandbox charge approved"
        );
        Ok(GatewayReceipt {
            reference: Self::reference("pay"),
        })
    }

    async fn refund(&self, req: GatewayRefund) -> Result<GatewayReceipt, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.decline_refunds {
            return Err(GatewayError::Declined {
                reference: None,
                reason: format!("refund of {} rejected", req.gateway_reference),
            });
        }

        Ok(GatewayReceipt {
            reference: Self::reference("rf"),
        })
    }
}
