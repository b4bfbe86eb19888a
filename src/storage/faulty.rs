use crate::domain::models::{RefundRecord, Reservation, Transaction, Transition};
use crate::error::AppError;
use crate::storage::memory::InMemoryStorage;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store with scripted outages. Each counter makes the next N calls of
/// that operation fail with `StoreUnavailable`.
#[derive(Clone, Default)]
pub(crate) struct FaultyStorage {
    pub inner: InMemoryStorage,
    pub reserve_failures: Arc<AtomicUsize>,
    pub transition_failures: Arc<AtomicUsize>,
    pub complete_refund_failures: Arc<AtomicUsize>,
    get_delay: Duration,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    pub fn fail_reserve(self, times: usize) -> Self {
        self.reserve_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_transition(self, times: usize) -> Self {
        self.transition_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn fail_complete_refund(self, times: usize) -> Self {
        self.complete_refund_failures.store(times, Ordering::SeqCst);
        self
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Storage for FaultyStorage {
    async fn reserve(&self, txn: Transaction) -> Result<Reservation, AppError> {
        if take(&self.reserve_failures) {
            // Failures still write, as if only the acknowledgement was lost.
            let _ = self.inner.reserve(txn).await;
            return Err(AppError::StoreUnavailable("connection reset".into()));
        }
        self.inner.reserve(txn).await
    }

    async fn get(&self, id: &str) -> Result<Option<Transaction>, AppError> {
        if !self.get_delay.is_zero() {
            tokio::time::sleep(self.get_delay).await;
        }
        self.inner.get(id).await
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>, AppError> {
        self.inner.find_by_order_id(order_id).await
    }

    async fn history(
        &self,
        user_id: &str,
        fund_id: Option<&str>,
    ) -> Result<Vec<Transaction>, AppError> {
        self.inner.history(user_id, fund_id).await
    }

    async fn transition(&self, id: &str, t: Transition) -> Result<Transaction, AppError> {
        if take(&self.transition_failures) {
            return Err(AppError::StoreUnavailable("blip".into()));
        }
        self.inner.transition(id, t).await
    }

    async fn mark_ledger_synced(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        self.inner.mark_ledger_synced(id, at).await
    }

    async fn claim_refund(&self, id: &str) -> Result<bool, AppError> {
        self.inner.claim_refund(id).await
    }

    async fn release_refund(&self, id: &str) -> Result<(), AppError> {
        self.inner.release_refund(id).await
    }

    async fn complete_refund(&self, record: RefundRecord) -> Result<Transaction, AppError> {
        if take(&self.complete_refund_failures) {
            return Err(AppError::StoreUnavailable("blip".into()));
        }
        self.inner.complete_refund(record).await
    }

    async fn refunds_for(&self, id: &str) -> Result<Vec<RefundRecord>, AppError> {
        self.inner.refunds_for(id).await
    }
}
