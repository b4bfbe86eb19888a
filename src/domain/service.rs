use crate::config::{whole_millis, Settings};
use crate::domain::models::{
    ChargeRequest, PaymentToken, Reservation, Transaction, TransactionStatus, Transition,
};
use crate::domain::order_id::issue_transaction_id;
use crate::domain::validation::validate_charge;
use crate::error::AppError;
use crate::gateway::{GatewayCharge, GatewayError, PaymentGateway};
use crate::ledger::{LedgerEntry, LedgerUpdater};
use crate::storage::Storage;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn, Instrument, Span};

#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub transaction: Transaction,
    /// True when the order had already been resolved and no new charge was made.
    pub replayed: bool,
}

/// Single entry point for charges. Drives validate, reserve, charge, persist and
/// ledger update, and owns the status transitions out of `PENDING`.
#[derive(Clone)]
pub struct TransactionService<S, G, L> {
    storage: S,
    gateway: G,
    ledger: L,
    settings: Arc<Settings>,
}

impl<S: Storage, G: PaymentGateway, L: LedgerUpdater> TransactionService<S, G, L> {
    pub fn new(storage: S, gateway: G, ledger: L, settings: Arc<Settings>) -> Self {
        Self {
            storage,
            gateway,
            ledger,
            settings,
        }
    }

    /// Charge a payment token. At most one gateway charge is ever made per order ID.
    #[instrument(
        skip(self, req),
        fields(order_id = tracing::field::Empty, transaction_id = tracing::field::Empty)
    )]
    pub async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, AppError> {
        let charge = validate_charge(req, &self.settings.limits)?;
        let span = Span::current();
        span.record("order_id", charge.order_id.as_str());

        let candidate = Transaction::pending(issue_transaction_id(), &charge, Utc::now());
        match self.reserve(candidate).await? {
            Reservation::Inserted(txn) => {
                span.record("transaction_id", txn.transaction_id.as_str());
                info!(
                    amount = txn.amount_minor_units,
                    currency = %txn.currency,
                    "order reserved"
                );
                let wait = self.settings.charge_wait(charge.wait);
                let transaction = self.drive_charge(txn, charge.payment_token, wait).await?;
                Ok(ChargeReceipt {
                    transaction,
                    replayed: false,
                })
            }
            Reservation::Existing(existing) => {
                span.record("transaction_id", existing.transaction_id.as_str());
                if !existing.matches_charge(&charge) {
                    warn!("order id reused for a different payment");
                    return Err(AppError::InvalidRequest(format!(
                        "orderId {} was already used for a different payment",
                        existing.order_id
                    )));
                }
                info!(status = %existing.status, "replaying existing order");
                let transaction = self.replay(existing).await?;
                Ok(ChargeReceipt {
                    transaction,
                    replayed: true,
                })
            }
        }
    }

    /// Retry the ledger update of a succeeded transaction. A no-op once synced.
    #[instrument(skip(self))]
    pub async fn resync_ledger(&self, transaction_id: &str) -> Result<Transaction, AppError> {
        let txn = self
            .storage
            .get(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;

        if txn.status != TransactionStatus::Succeeded {
            return Err(AppError::InvalidState {
                transaction_id: txn.transaction_id,
                status: txn.status,
                action: "synced to the ledger",
            });
        }

        self.sync_ledger(txn).await
    }

    async fn reserve(&self, candidate: Transaction) -> Result<Reservation, AppError> {
        let mut attempt = 0;
        let reservation = loop {
            match self.storage.reserve(candidate.clone()).await {
                Err(AppError::StoreUnavailable(reason)) => {
                    if !self.pause_before_retry("reserve", attempt, &reason).await {
                        return Err(AppError::StoreUnavailable(reason));
                    }
                    attempt += 1;
                }
                other => break other?,
            }
        };

        // A retried insert may find the row its own lost acknowledgement created.
        match reservation {
            Reservation::Existing(existing)
                if existing.transaction_id == candidate.transaction_id =>
            {
                Ok(Reservation::Inserted(existing))
            }
            other => Ok(other),
        }
    }

    /// Runs the gateway leg in its own task so the outcome is persisted even if the
    /// caller stops waiting.
    async fn drive_charge(
        &self,
        txn: Transaction,
        token: PaymentToken,
        wait: Duration,
    ) -> Result<Transaction, AppError> {
        let transaction_id = txn.transaction_id.clone();
        let svc = self.clone();
        let task = tokio::spawn(
            async move { svc.settle_charge(txn, token).await }.in_current_span(),
        );

        match tokio::time::timeout(wait, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(AppError::Internal(format!(
                "charge task for {transaction_id} ended abnormally: {join}"
            ))),
            Err(_) => {
                warn!(
                    timeout_ms = whole_millis(wait),
                    "gateway did not answer in time; outcome pending"
                );
                let current = self
                    .storage
                    .get(&transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(transaction_id.clone()))?;
                self.conclude(current).await
            }
        }
    }

    async fn settle_charge(
        &self,
        txn: Transaction,
        token: PaymentToken,
    ) -> Result<Transaction, AppError> {
        let request = GatewayCharge {
            idempotency_key: txn.order_id.clone(),
            token,
            amount_minor_units: txn.amount_minor_units,
            currency: txn.currency,
            description: describe(&txn),
        };

        let transition = match self.gateway.charge(request).await {
            Ok(receipt) => {
                info!(gateway_reference = %receipt.reference, "gateway approved charge");
                Transition::succeed(receipt.reference)
            }
            Err(GatewayError::Declined { reference, reason }) => {
                info!(%reason, "gateway declined charge");
                Transition::fail(reference, reason)
            }
            Err(GatewayError::Indeterminate(detail)) => {
                warn!(%detail, "gateway outcome unknown; transaction left pending");
                return Err(AppError::Indeterminate {
                    transaction: Box::new(txn),
                });
            }
        };

        let to = transition.to;
        let reference = transition.gateway_reference.clone();
        match self.apply(&txn.transaction_id, transition).await {
            Ok(resolved) => self.conclude(resolved).await,
            Err(e) => {
                error!(
                    error = %e,
                    outcome = %to,
                    gateway_reference = reference.as_deref().unwrap_or(""),
                    "gateway answered but the outcome could not be recorded"
                );
                Err(AppError::Indeterminate {
                    transaction: Box::new(txn),
                })
            }
        }
    }

    /// Compare-and-set on the stored status. The gateway outcome is already known here,
    /// so `StoreUnavailable` is retried with capped backoff until the write lands.
    /// Losing the race adopts the winner's record.
    async fn apply(
        &self,
        transaction_id: &str,
        transition: Transition,
    ) -> Result<Transaction, AppError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .storage
                .transition(transaction_id, transition.clone())
                .await
            {
                Err(AppError::StoreUnavailable(reason)) => {
                    let delay = self.settings.backoff(attempt);
                    warn!(
                        op = "transition",
                        attempt = attempt.saturating_add(1),
                        delay_ms = whole_millis(delay),
                        %reason,
                        "store unavailable, outcome not yet recorded"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(AppError::InvalidStateTransition { from, to }) => {
                    warn!(%from, %to, "transition lost to a concurrent writer");
                    return self
                        .storage
                        .get(transaction_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(transaction_id.to_string()));
                }
                other => return other,
            }
        }
    }

    async fn replay(&self, existing: Transaction) -> Result<Transaction, AppError> {
        if existing.status == TransactionStatus::Pending {
            return Err(AppError::ConflictInProgress {
                order_id: existing.order_id,
            });
        }
        self.conclude(existing).await
    }

    /// Maps a stored record to what the caller is told.
    async fn conclude(&self, txn: Transaction) -> Result<Transaction, AppError> {
        match txn.status {
            TransactionStatus::Pending => Err(AppError::Indeterminate {
                transaction: Box::new(txn),
            }),
            TransactionStatus::Succeeded => self.sync_ledger(txn).await,
            TransactionStatus::Failed => Err(AppError::GatewayDeclined {
                transaction: Box::new(txn),
            }),
            TransactionStatus::Refunded => Ok(txn),
        }
    }

    async fn sync_ledger(&self, txn: Transaction) -> Result<Transaction, AppError> {
        if txn.ledger_synced_at.is_some() {
            return Ok(txn);
        }

        let update = self.ledger.mark_periods_paid(LedgerEntry::from(&txn));
        let reason = match tokio::time::timeout(self.settings.ledger_timeout, update).await {
            Ok(Ok(applied)) => {
                info!(transaction_id = %txn.transaction_id, ?applied, "ledger updated");
                return self
                    .storage
                    .mark_ledger_synced(&txn.transaction_id, Utc::now())
                    .await;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "ledger update timed out".to_string(),
        };

        error!(
            transaction_id = %txn.transaction_id,
            %reason,
            "ledger update failed after successful charge"
        );
        Err(AppError::LedgerSyncFailed {
            transaction: Box::new(txn),
            reason,
        })
    }

    /// Sleeps before the next store attempt. False once retries are exhausted.
    async fn pause_before_retry(&self, op: &str, attempt: u32, reason: &str) -> bool {
        if attempt >= self.settings.reserve_retries {
            return false;
        }
        warn!(op, attempt = attempt + 1, reason, "store unavailable, retrying");
        tokio::time::sleep(self.settings.backoff(attempt)).await;
        true
    }
}

fn describe(txn: &Transaction) -> String {
    let periods = txn
        .periods
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Fund {} contribution for period(s) {}", txn.fund_id, periods)
}
