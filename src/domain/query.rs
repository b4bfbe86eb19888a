use crate::domain::models::{HistoryFilters, RefundRecord, Transaction};
use crate::error::AppError;
use crate::storage::Storage;
use tracing::instrument;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 200;

/// Read-only views over the store.
#[derive(Clone)]
pub struct QueryService<S> {
    storage: S,
}

impl<S: Storage> QueryService<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    #[instrument(skip(self))]
    pub async fn get_by_transaction_id(&self, transaction_id: &str) -> Result<Transaction, AppError> {
        self.storage
            .get(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_by_order_id(&self, order_id: &str) -> Result<Transaction, AppError> {
        self.storage
            .find_by_order_id(order_id.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(order_id.to_string()))
    }

    /// Newest first. Each call reads a fresh snapshot.
    #[instrument(skip(self, filters), fields(fund_id = ?filters.fund_id))]
    pub async fn get_history(
        &self,
        user_id: &str,
        filters: HistoryFilters,
    ) -> Result<Vec<Transaction>, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidRequest("userId must not be empty".into()));
        }

        let limit = match filters.limit {
            None => DEFAULT_HISTORY_LIMIT,
            Some(0) => return Err(AppError::InvalidRequest("limit must be positive".into())),
            Some(n) => n.min(MAX_HISTORY_LIMIT),
        };

        let fund_id = filters
            .fund_id
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        let mut txns = self.storage.history(user_id, fund_id).await?;
        txns.truncate(limit);
        Ok(txns)
    }

    #[instrument(skip(self))]
    pub async fn refunds(&self, transaction_id: &str) -> Result<Vec<RefundRecord>, AppError> {
        self.get_by_transaction_id(transaction_id).await?;
        self.storage.refunds_for(transaction_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::domain::models::{ChargeRequest, TransactionStatus};
    use crate::domain::service::TransactionService;
    use crate::gateway::sandbox::SandboxGateway;
    use crate::ledger::memory::InMemoryLedger;
    use crate::storage::memory::InMemoryStorage;
    use std::sync::Arc;

    fn charge_req(order: &str, fund: &str) -> ChargeRequest {
        ChargeRequest {
            payment_token: Some("tok_ok".into()),
            amount_minor_units: Some(10_000),
            currency: Some("INR".into()),
            fund_id: Some(fund.into()),
            periods: Some(vec![1]),
            user_id: Some("U1".into()),
            order_id: Some(order.into()),
            timeout_ms: None,
        }
    }

    async fn seeded() -> (QueryService<InMemoryStorage>, Vec<Transaction>) {
        let storage = InMemoryStorage::new();
        let charges = TransactionService::new(
            storage.clone(),
            SandboxGateway::new(),
            InMemoryLedger::new(),
            Arc::new(Settings::default()),
        );
        let mut created = Vec::new();
        for (order, fund) in [("O1", "F1"), ("O2", "F2"), ("O3", "F1")] {
            created.push(charges.charge(charge_req(order, fund)).await.unwrap().transaction);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        (QueryService::new(storage), created)
    }

    #[tokio::test]
    async fn lookup_by_id_and_order() {
        let (svc, created) = seeded().await;
        let txn = svc
            .get_by_transaction_id(&created[0].transaction_id)
            .await
            .unwrap();
        assert_eq!(txn.order_id, "O1");
        assert_eq!(txn.status, TransactionStatus::Succeeded);

        let by_order = svc.get_by_order_id("O2").await.unwrap();
        assert_eq!(by_order.transaction_id, created[1].transaction_id);
    }

    #[tokio::test]
    async fn missing_transaction_not_found() {
        let (svc, _) = seeded().await;
        assert!(matches!(
            svc.get_by_transaction_id("txn_nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(svc.refunds("txn_nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let (svc, _) = seeded().await;
        let all = svc.get_history("U1", HistoryFilters::default()).await.unwrap();
        let orders: Vec<_> = all.iter().map(|t| t.order_id.as_str()).collect();
        assert_eq!(orders, vec!["O3", "O2", "O1"]);
    }

    #[tokio::test]
    async fn history_filters_by_fund_and_limit() {
        let (svc, _) = seeded().await;
        let f1 = svc
            .get_history(
                "U1",
                HistoryFilters {
                    fund_id: Some("F1".into()),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(f1.len(), 2);
        assert!(f1.iter().all(|t| t.fund_id == "F1"));

        let one = svc
            .get_history(
                "U1",
                HistoryFilters {
                    fund_id: None,
                    limit: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].order_id, "O3");
    }

    #[tokio::test]
    async fn history_of_unknown_user_is_empty() {
        let (svc, _) = seeded().await;
        let none = svc.get_history("U9", HistoryFilters::default()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn history_rejects_zero_limit() {
        let (svc, _) = seeded().await;
        let result = svc
            .get_history(
                "U1",
                HistoryFilters {
                    fund_id: None,
                    limit: Some(0),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
