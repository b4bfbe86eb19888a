use crate::domain::models::{
    RefundRecord, Reservation, Transaction, TransactionStatus, Transition,
};
use crate::error::AppError;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    transactions: HashMap<String, Transaction>,
    by_order: HashMap<String, String>,
    refunds: Vec<RefundRecord>,
    refunds_in_flight: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    async fn reserve(&self, txn: Transaction) -> Result<Reservation, AppError> {
        let mut store = self.data.write().await;

        if let Some(existing_id) = store.by_order.get(&txn.order_id) {
            let existing = store
                .transactions
                .get(existing_id)
                .cloned()
                .ok_or_else(|| AppError::Internal(format!("dangling order index {existing_id}")))?;
            return Ok(Reservation::Existing(existing));
        }

        if store.transactions.contains_key(&txn.transaction_id) {
            return Err(AppError::Internal(format!(
                "transaction id collision {}",
                txn.transaction_id
            )));
        }

        store
            .by_order
            .insert(txn.order_id.clone(), txn.transaction_id.clone());
        store
            .transactions
            .insert(txn.transaction_id.clone(), txn.clone());
        Ok(Reservation::Inserted(txn))
    }

    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>, AppError> {
        let store = self.data.read().await;
        Ok(store.transactions.get(transaction_id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Transaction>, AppError> {
        let store = self.data.read().await;
        Ok(store
            .by_order
            .get(order_id)
            .and_then(|id| store.transactions.get(id))
            .cloned())
    }

    async fn history(
        &self,
        user_id: &str,
        fund_id: Option<&str>,
    ) -> Result<Vec<Transaction>, AppError> {
        let store = self.data.read().await;
        let mut results: Vec<Transaction> = store
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| fund_id.is_none_or(|f| t.fund_id == f))
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.transaction_id.cmp(&a.transaction_id))
        });
        Ok(results)
    }

    async fn transition(
        &self,
        transaction_id: &str,
        transition: Transition,
    ) -> Result<Transaction, AppError> {
        let mut store = self.data.write().await;
        let txn = store
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;

        if txn.status != transition.from || !txn.status.can_transition_to(transition.to) {
            return Err(AppError::InvalidStateTransition {
                from: txn.status,
                to: transition.to,
            });
        }

        txn.status = transition.to;
        if let Some(reference) = transition.gateway_reference {
            txn.gateway_reference.get_or_insert(reference);
        }
        if transition.failure_reason.is_some() {
            txn.failure_reason = transition.failure_reason;
        }
        txn.updated_at = txn.updated_at.max(Utc::now());
        Ok(txn.clone())
    }

    async fn mark_ledger_synced(
        &self,
        transaction_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let mut store = self.data.write().await;
        let txn = store
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;

        if txn.ledger_synced_at.is_none() {
            txn.ledger_synced_at = Some(at);
            txn.updated_at = txn.updated_at.max(at);
        }
        Ok(txn.clone())
    }

    async fn claim_refund(&self, transaction_id: &str) -> Result<bool, AppError> {
        let mut store = self.data.write().await;
        Ok(store.refunds_in_flight.insert(transaction_id.to_string()))
    }

    async fn release_refund(&self, transaction_id: &str) -> Result<(), AppError> {
        let mut store = self.data.write().await;
        store.refunds_in_flight.remove(transaction_id);
        Ok(())
    }

    async fn complete_refund(&self, record: RefundRecord) -> Result<Transaction, AppError> {
        let mut store = self.data.write().await;
        let already_stored = store.refunds.iter().any(|r| r.refund_id == record.refund_id);
        let txn = store
            .transactions
            .get_mut(&record.original_transaction_id)
            .ok_or_else(|| AppError::NotFound(record.original_transaction_id.clone()))?;

        if already_stored && txn.status == TransactionStatus::Refunded {
            return Ok(txn.clone());
        }
        if txn.status != TransactionStatus::Succeeded {
            return Err(AppError::InvalidStateTransition {
                from: txn.status,
                to: TransactionStatus::Refunded,
            });
        }

        txn.status = TransactionStatus::Refunded;
        txn.updated_at = txn.updated_at.max(record.created_at);
        let refunded = txn.clone();
        store.refunds.push(record);
        Ok(refunded)
    }

    async fn refunds_for(&self, transaction_id: &str) -> Result<Vec<RefundRecord>, AppError> {
        let store = self.data.read().await;
        Ok(store
            .refunds
            .iter()
            .filter(|r| r.original_transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
