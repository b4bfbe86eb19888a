use anyhow::Context;
use fund_payments::api::{build_router, AppState};
use fund_payments::config::Settings;
use fund_payments::gateway::sandbox::SandboxGateway;
use fund_payments::ledger::memory::InMemoryLedger;
use fund_payments::storage::memory::InMemoryStorage;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let settings = Settings::from_env().context("loading configuration")?;
    let addr = settings.bind_addr.clone();

    let storage = InMemoryStorage::new();
    let gateway = SandboxGateway::new().with_latency(settings.sandbox_latency);
    let ledger = InMemoryLedger::new();
    let state = AppState::new(storage, gateway, ledger, settings);

    let app = build_router(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
