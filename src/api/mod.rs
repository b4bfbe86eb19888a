pub mod handlers;
pub mod responses;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::query::QueryService;
use crate::domain::refund::RefundService;
use crate::domain::service::TransactionService;
use crate::gateway::PaymentGateway;
use crate::ledger::LedgerUpdater;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState<S, G, L> {
    pub transactions: TransactionService<S, G, L>,
    pub refunds: RefundService<S, G>,
    pub queries: QueryService<S>,
}

impl<S: Storage, G: PaymentGateway, L: LedgerUpdater> AppState<S, G, L> {
    pub fn new(storage: S, gateway: G, ledger: L, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        Self {
            transactions: TransactionService::new(
                storage.clone(),
                gateway.clone(),
                ledger,
                settings.clone(),
            ),
            refunds: RefundService::new(storage.clone(), gateway, settings),
            queries: QueryService::new(storage),
        }
    }
}

pub fn build_router<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    state: AppState<S, G, L>,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/orders", post(handlers::issue_order))
        .route("/api/v1/orders/{order_id}", get(handlers::get_order::<S, G, L>))
        .route("/api/v1/transactions", post(handlers::charge::<S, G, L>))
        .route(
            "/api/v1/transactions/refund",
            post(handlers::refund::<S, G, L>),
        )
        .route(
            "/api/v1/transactions/history/{user_id}",
            get(handlers::history::<S, G, L>),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(handlers::get_transaction::<S, G, L>),
        )
        .route(
            "/api/v1/transactions/{id}/refunds",
            get(handlers::list_refunds::<S, G, L>),
        )
        .route(
            "/api/v1/transactions/{id}/ledger-sync",
            post(handlers::resync_ledger::<S, G, L>),
        )
        .with_state(state)
}
