//! Webhook receiver
//!
//! Accepts the gateway's pushed events and routes connection updates to the
//! live session they name. Unknown sessions and non-connection events are
//! acknowledged so the gateway does not retry them.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use wl_app::PairingRegistry;
use wl_infra::parse_webhook;

pub const WEBHOOK_PATH: &str = "/webhook";

pub fn router(registry: Arc<PairingRegistry>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// `202` when the update reached a live session, `200` when it was ignored.
async fn receive_webhook(
    State(registry): State<Arc<PairingRegistry>>,
    body: Bytes,
) -> StatusCode {
    let update = match parse_webhook(&body) {
        Ok(Some(update)) => update,
        Ok(None) => return StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "rejected webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    let Some(open) = update.is_open() else {
        return StatusCode::OK;
    };

    if registry
        .route_connection_update(&update.session_id, open)
        .await
    {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    }
}

/// Serve the webhook router until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<PairingRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, path = WEBHOOK_PATH, "webhook receiver listening");
    }
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Webhook receiver failed")
}
