use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use fund_payments::api::{build_router, AppState};
use fund_payments::config::Settings;
use fund_payments::gateway::sandbox::SandboxGateway;
use fund_payments::ledger::memory::InMemoryLedger;
use fund_payments::storage::memory::InMemoryStorage;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    app: axum::Router,
    gateway: SandboxGateway,
    ledger: InMemoryLedger,
}

fn harness_with(gateway: SandboxGateway, settings: Settings) -> Harness {
    let ledger = InMemoryLedger::new();
    let state = AppState::new(
        InMemoryStorage::new(),
        gateway.clone(),
        ledger.clone(),
        settings,
    );
    Harness {
        app: build_router(state),
        gateway,
        ledger,
    }
}

fn harness() -> Harness {
    harness_with(SandboxGateway::new(), Settings::default())
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp.into_body()).await)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn charge_body(order: &str, token: &str) -> Value {
    json!({
        "orderId": order,
        "amountMinorUnits": 500000,
        "currency": "INR",
        "periods": [1, 2],
        "userId": "U1",
        "fundId": "F1",
        "paymentToken": token
    })
}

#[tokio::test]
async fn health_check() {
    let h = harness();
    let (status, json) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn issued_order_ids_are_distinct() {
    let h = harness();
    let (status, first) = send(&h.app, post("/api/v1/orders", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&h.app, post("/api/v1/orders", json!({}))).await;
    assert_eq!(first["success"], true);
    assert_ne!(first["orderId"], second["orderId"]);
}

#[tokio::test]
async fn charge_succeeds_and_updates_ledger() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["orderId"], "O1");
    assert_eq!(json["amountMinorUnits"], 500000);
    assert_eq!(json["currency"], "INR");
    assert_eq!(json["status"], "SUCCEEDED");
    assert!(json["transactionId"].as_str().unwrap().starts_with("txn_"));
    assert_eq!(
        h.ledger.paid_periods("U1", "F1").await,
        BTreeSet::from([1, 2])
    );
}

#[tokio::test]
async fn repeated_order_returns_original_transaction() {
    let h = harness();
    let (_, first) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;
    let (status, second) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["transactionId"], first["transactionId"]);
    assert_eq!(second["status"], "SUCCEEDED");
    assert_eq!(second["replayed"], true);
    assert_eq!(h.gateway.charge_calls(), 1);
    assert_eq!(h.ledger.applications(), 1);
}

#[tokio::test]
async fn amount_below_minimum_returns_400() {
    let h = harness();
    let mut body = charge_body("O-low", "tok_ok");
    body["amountMinorUnits"] = json!(50);

    let (status, json) = send(&h.app, post("/api/v1/transactions", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("amountMinorUnits"));
    assert_eq!(h.gateway.charge_calls(), 0);

    let (status, _) = send(&h.app, get("/api/v1/orders/O-low")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_field_returns_400() {
    let h = harness();
    let mut body = charge_body("O2", "tok_ok");
    body.as_object_mut().unwrap().remove("paymentToken");

    let (status, json) = send(&h.app, post("/api/v1/transactions", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "paymentToken is required");
}

#[tokio::test]
async fn malformed_json_uses_error_envelope() {
    let h = harness();
    let req = Request::builder()
        .method(http::Method::POST)
        .uri("/api/v1/transactions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn declined_charge_returns_400_with_reason() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O-dec", "tok_decline")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["status"], "FAILED");
    assert!(json["error"].as_str().unwrap().contains("declined"));

    let id = json["transactionId"].as_str().unwrap();
    let (status, fetched) = send(&h.app, get(&format!("/api/v1/transactions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["transaction"]["status"], "FAILED");
    assert!(fetched["transaction"]["failureReason"].is_string());
    assert_eq!(h.ledger.applications(), 0);
}

#[tokio::test]
async fn indeterminate_charge_is_pollable() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        post(
            "/api/v1/transactions",
            charge_body("O-unk", "tok_indeterminate"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "PENDING");

    let (status, conflict) = send(
        &h.app,
        post(
            "/api/v1/transactions",
            charge_body("O-unk", "tok_indeterminate"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["orderId"], "O-unk");
    assert_eq!(h.gateway.charge_calls(), 1);
}

#[tokio::test]
async fn slow_gateway_resolves_after_response() {
    let h = harness_with(
        SandboxGateway::new().with_slow_for(Duration::from_millis(100)),
        Settings {
            charge_timeout: Duration::from_millis(20),
            ..Settings::default()
        },
    );
    let (status, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O-slow", "tok_slow")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = json["transactionId"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, fetched) = send(&h.app, get(&format!("/api/v1/transactions/{id}"))).await;
    assert_eq!(fetched["transaction"]["status"], "SUCCEEDED");
    assert_eq!(fetched["transaction"]["ledgerSynced"], true);
}

#[tokio::test]
async fn request_timeout_shortens_the_wait() {
    let h = harness_with(
        SandboxGateway::new().with_slow_for(Duration::from_millis(100)),
        Settings::default(),
    );
    let mut body = charge_body("O-hurry", "tok_slow");
    body["timeoutMs"] = json!(20);
    let (status, json) = send(&h.app, post("/api/v1/transactions", body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "PENDING");

    let mut bad = charge_body("O-bad-wait", "tok_ok");
    bad["timeoutMs"] = json!(0);
    let (status, json) = send(&h.app, post("/api/v1/transactions", bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "timeoutMs must be greater than zero");
}

#[tokio::test]
async fn get_nonexistent_returns_404() {
    let h = harness();
    let (status, json) = send(&h.app, get("/api/v1/transactions/txn_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Transaction not found");
}

#[tokio::test]
async fn transaction_projection_hides_gateway_reference() {
    let h = harness();
    let (_, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;
    let id = json["transactionId"].as_str().unwrap();

    let (_, fetched) = send(&h.app, get(&format!("/api/v1/transactions/{id}"))).await;
    let txn = fetched["transaction"].as_object().unwrap();
    assert!(!txn.contains_key("gatewayReference"));
    assert!(!txn.contains_key("paymentToken"));
    assert_eq!(txn["periods"], json!([1, 2]));
}

#[tokio::test]
async fn history_is_ordered_and_filtered() {
    let h = harness();
    for (order, fund) in [("H1", "F1"), ("H2", "F2"), ("H3", "F1")] {
        let mut body = charge_body(order, "tok_ok");
        body["fundId"] = json!(fund);
        send(&h.app, post("/api/v1/transactions", body)).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (status, all) = send(&h.app, get("/api/v1/transactions/history/U1")).await;
    assert_eq!(status, StatusCode::OK);
    let orders: Vec<_> = all["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["orderId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(orders, vec!["H3", "H2", "H1"]);

    let (_, f1) = send(&h.app, get("/api/v1/transactions/history/U1?fundId=F1")).await;
    assert_eq!(f1["transactions"].as_array().unwrap().len(), 2);

    let (_, limited) = send(&h.app, get("/api/v1/transactions/history/U1?limit=1")).await;
    assert_eq!(limited["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn refund_flow() {
    let h = harness();
    let (_, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;
    let id = json["transactionId"].as_str().unwrap().to_string();

    let (status, refund) = send(
        &h.app,
        post(
            "/api/v1/transactions/refund",
            json!({ "transactionId": id, "reason": "duplicate" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refund["success"], true);
    assert!(refund["refundId"].as_str().unwrap().starts_with("rfnd_"));
    assert_eq!(refund["amountMinorUnits"], 500000);

    let (_, fetched) = send(&h.app, get(&format!("/api/v1/transactions/{id}"))).await;
    assert_eq!(fetched["transaction"]["status"], "REFUNDED");

    let (_, refunds) = send(&h.app, get(&format!("/api/v1/transactions/{id}/refunds"))).await;
    assert_eq!(refunds["refunds"].as_array().unwrap().len(), 1);

    let (status, again) = send(
        &h.app,
        post("/api/v1/transactions/refund", json!({ "transactionId": id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["success"], false);
    assert_eq!(h.gateway.refund_calls(), 1);
}

#[tokio::test]
async fn refund_of_failed_transaction_rejected() {
    let h = harness();
    let (_, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O-dec", "tok_decline")),
    )
    .await;
    let id = json["transactionId"].as_str().unwrap().to_string();

    let (status, _) = send(
        &h.app,
        post("/api/v1/transactions/refund", json!({ "transactionId": id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, fetched) = send(&h.app, get(&format!("/api/v1/transactions/{id}"))).await;
    assert_eq!(fetched["transaction"]["status"], "FAILED");
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn refund_of_unknown_transaction_returns_404() {
    let h = harness();
    let (status, json) = send(
        &h.app,
        post(
            "/api/v1/transactions/refund",
            json!({ "transactionId": "txn_missing" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Transaction not found");
}

#[tokio::test]
async fn ledger_sync_endpoint_is_idempotent() {
    let h = harness();
    let (_, json) = send(
        &h.app,
        post("/api/v1/transactions", charge_body("O1", "tok_ok")),
    )
    .await;
    let id = json["transactionId"].as_str().unwrap();

    let (status, synced) = send(
        &h.app,
        post(&format!("/api/v1/transactions/{id}/ledger-sync"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["transaction"]["ledgerSynced"], true);
    assert_eq!(h.ledger.applications(), 1);
}
