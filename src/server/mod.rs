//! HTTP surface: liveness probe and the webhook endpoint.
//!
//! The webhook always answers 200; the outcome lives in the body's `status`
//! field so alerting services never retry a signal.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::strategy::SignalDispatcher;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<SignalDispatcher>,
}

/// Build the application router.
pub fn router(dispatcher: Arc<SignalDispatcher>) -> Router {
    Router::new()
        // GET routes also answer HEAD with the body stripped
        .route("/", get(liveness))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, dispatcher: Arc<SignalDispatcher>) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Webhook server listening");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        // Without a signal handler, keep serving.
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn liveness() -> Json<Value> {
    Json(json!({"status": "alive"}))
}

async fn webhook(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match state.dispatcher.dispatch(&body).await {
        Ok(report) => {
            let message = report.message();
            info!(
                action = %report.action,
                failed_steps = report.failed_steps(),
                %message,
                "Webhook handled"
            );
            Json(json!({
                "status": "success",
                "message": message,
                "action": report.action,
                "symbol": report.symbol,
                "position": report.position,
                "steps": report.steps,
            }))
        }
        Err(e) => Json(json!({
            "status": "error",
            "message": e.to_string(),
            "kind": e.kind(),
        })),
    }
}
