use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::responses::{
    ApiResponse, ChargeView, HistoryBody, OrderIdView, RefundView, RefundsBody, TransactionBody,
};
use crate::api::AppState;
use crate::domain::models::{ChargeRequest, HistoryFilters, RefundRequest};
use crate::domain::order_id::issue_order_id;
use crate::error::AppError;
use crate::gateway::PaymentGateway;
use crate::ledger::LedgerUpdater;
use crate::storage::Storage;

fn bad_json(rejection: JsonRejection) -> AppError {
    AppError::InvalidRequest(rejection.body_text())
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn issue_order() -> impl IntoResponse {
    Json(ApiResponse::new(OrderIdView {
        order_id: issue_order_id(),
    }))
}

pub async fn charge<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(bad_json)?;
    let receipt = state.transactions.charge(req).await?;
    Ok(Json(ApiResponse::new(ChargeView::from(receipt))))
}

pub async fn get_transaction<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.queries.get_by_transaction_id(&id).await?;
    Ok(Json(ApiResponse::new(TransactionBody {
        transaction: txn.into(),
    })))
}

pub async fn get_order<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.queries.get_by_order_id(&order_id).await?;
    Ok(Json(ApiResponse::new(TransactionBody {
        transaction: txn.into(),
    })))
}

pub async fn history<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    Path(user_id): Path<String>,
    filters: Result<Query<HistoryFilters>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let txns = state.queries.get_history(&user_id, filters).await?;
    Ok(Json(ApiResponse::new(HistoryBody {
        user_id,
        transactions: txns.into_iter().map(Into::into).collect(),
    })))
}

pub async fn list_refunds<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let refunds = state.queries.refunds(&id).await?;
    Ok(Json(ApiResponse::new(RefundsBody {
        refunds: refunds.into_iter().map(Into::into).collect(),
    })))
}

pub async fn refund<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(bad_json)?;
    let record = state.refunds.refund(req).await?;
    Ok(Json(ApiResponse::new(RefundView::from(record))))
}

pub async fn resync_ledger<S: Storage, G: PaymentGateway, L: LedgerUpdater>(
    State(state): State<AppState<S, G, L>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.transactions.resync_ledger(&id).await?;
    Ok(Json(ApiResponse::new(TransactionBody {
        transaction: txn.into(),
    })))
}
