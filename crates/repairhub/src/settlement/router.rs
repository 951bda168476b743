use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use crate::scheduling::repository::SchedulingRepository;

use super::ledger::LedgerRepository;
use super::webhook::{ReconciliationHandler, WebhookEnvelope};

/// Router builder for the inbound gateway webhook.
///
/// The endpoint acknowledges with success whenever the event was durably
/// processed or intentionally dropped-and-logged; only an infrastructure
/// failure answers 5xx, which is the one case the gateway should retry.
pub fn webhook_router<R, L>(handler: Arc<ReconciliationHandler<R, L>>) -> Router
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    Router::new()
        .route("/webhooks/gateway", post(webhook_handler::<R, L>))
        .with_state(handler)
}

pub(crate) async fn webhook_handler<R, L>(
    State(handler): State<Arc<ReconciliationHandler<R, L>>>,
    axum::Json(envelope): axum::Json<WebhookEnvelope>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match handler.handle(envelope) {
        Ok(outcome) => {
            let payload = json!({ "outcome": outcome });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
