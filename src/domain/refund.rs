use crate::config::{whole_millis, Settings};
use crate::domain::models::{RefundRecord, RefundRequest, Transaction, TransactionStatus};
use crate::domain::order_id::issue_refund_id;
use crate::domain::validation::validate_refund;
use crate::error::AppError;
use crate::gateway::{GatewayError, GatewayRefund, PaymentGateway};
use crate::storage::Storage;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Instrument, Span};

/// Full refunds of succeeded transactions. A smaller `amount` is passed to the gateway
/// as-is but still ends the transaction in `REFUNDED`.
#[derive(Clone)]
pub struct RefundService<S, G> {
    storage: S,
    gateway: G,
    settings: Arc<Settings>,
}

impl<S: Storage, G: PaymentGateway> RefundService<S, G> {
    pub fn new(storage: S, gateway: G, settings: Arc<Settings>) -> Self {
        Self {
            storage,
            gateway,
            settings,
        }
    }

    #[instrument(skip(self, req), fields(transaction_id = tracing::field::Empty))]
    pub async fn refund(&self, req: RefundRequest) -> Result<RefundRecord, AppError> {
        let refund = validate_refund(&req)?;
        let transaction_id = refund.transaction_id;
        Span::current().record("transaction_id", transaction_id.as_str());

        let txn = self.refundable(&transaction_id).await?;
        let amount = req.amount.unwrap_or(txn.amount_minor_units);
        if amount > txn.amount_minor_units {
            return Err(AppError::InvalidRequest(format!(
                "amount must not exceed the original {} minor units",
                txn.amount_minor_units
            )));
        }

        // Slot claim and release live entirely in the task; the caller may be dropped.
        let svc = self.clone();
        let reason = req.reason;
        let task = tokio::spawn(
            async move { svc.run_refund(txn, amount, reason).await }.in_current_span(),
        );

        let wait = self.settings.refund_wait(refund.wait);
        match tokio::time::timeout(wait, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AppError::Internal(format!(
                "refund task for {transaction_id} ended abnormally: {join}"
            ))),
            Err(_) => {
                warn!(
                    timeout_ms = whole_millis(wait),
                    "gateway did not answer the refund in time"
                );
                let current = self
                    .storage
                    .get(&transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(transaction_id.clone()))?;
                Err(AppError::Indeterminate {
                    transaction: Box::new(current),
                })
            }
        }
    }

    async fn refundable(&self, transaction_id: &str) -> Result<Transaction, AppError> {
        let txn = self
            .storage
            .get(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;

        if txn.status != TransactionStatus::Succeeded {
            return Err(AppError::InvalidState {
                transaction_id: txn.transaction_id,
                status: txn.status,
                action: "refunded",
            });
        }
        Ok(txn)
    }

    async fn run_refund(
        &self,
        seen: Transaction,
        amount: i64,
        reason: Option<String>,
    ) -> Result<RefundRecord, AppError> {
        if !self.storage.claim_refund(&seen.transaction_id).await? {
            return Err(AppError::ConflictInProgress {
                order_id: seen.order_id,
            });
        }

        // Another refund may have finished between the first read and the claim.
        let result = match self.refundable(&seen.transaction_id).await {
            Ok(txn) => self.settle_refund(&txn, amount, reason).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.storage.release_refund(&seen.transaction_id).await {
            error!(error = %e, "failed to release refund slot");
        }
        result
    }

    async fn settle_refund(
        &self,
        txn: &Transaction,
        amount: i64,
        reason: Option<String>,
    ) -> Result<RefundRecord, AppError> {
        let gateway_reference = txn.gateway_reference.clone().ok_or_else(|| {
            AppError::Internal(format!(
                "succeeded transaction {} has no gateway reference",
                txn.transaction_id
            ))
        })?;

        let request = GatewayRefund {
            idempotency_key: format!("refund:{}", txn.transaction_id),
            gateway_reference,
            amount_minor_units: amount,
            currency: txn.currency,
            reason: reason.clone(),
        };

        let receipt = match self.gateway.refund(request).await {
            Ok(receipt) => receipt,
            Err(GatewayError::Declined { reason, .. }) => {
                warn!(%reason, "gateway declined refund");
                return Err(AppError::RefundDeclined(reason));
            }
            Err(GatewayError::Indeterminate(detail)) => {
                warn!(%detail, "refund outcome unknown; transaction left succeeded");
                return Err(AppError::Indeterminate {
                    transaction: Box::new(txn.clone()),
                });
            }
        };

        let record = RefundRecord {
            refund_id: issue_refund_id(),
            original_transaction_id: txn.transaction_id.clone(),
            amount_minor_units: amount,
            currency: txn.currency,
            reason,
            gateway_reference: receipt.reference,
            created_at: Utc::now(),
        };
        self.record_refund(&record).await?;

        info!(refund_id = %record.refund_id, amount, "refund completed");
        Ok(record)
    }

    /// Writes `REFUNDED` and the record together. The gateway has already paid out, so
    /// `StoreUnavailable` is retried with capped backoff until the write lands.
    async fn record_refund(&self, record: &RefundRecord) -> Result<(), AppError> {
        let mut attempt: u32 = 0;
        loop {
            match self.storage.complete_refund(record.clone()).await {
                Ok(_) => return Ok(()),
                Err(AppError::StoreUnavailable(reason)) => {
                    let delay = self.settings.backoff(attempt);
                    warn!(
                        op = "complete_refund",
                        attempt = attempt.saturating_add(1),
                        delay_ms = whole_millis(delay),
                        %reason,
                        "store unavailable, refund not yet recorded"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        refund_id = %record.refund_id,
                        gateway_reference = %record.gateway_reference,
                        "gateway refunded but the refund could not be recorded"
                    );
                    return Err(e);
                }
            }
        }
    }
}
