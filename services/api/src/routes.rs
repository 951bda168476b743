use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use repairhub::scheduling::repository::SchedulingRepository;
use repairhub::scheduling::router::{scheduling_router, SchedulingApi};
use repairhub::settlement::ledger::LedgerRepository;
use repairhub::settlement::router::webhook_router;
use repairhub::settlement::webhook::ReconciliationHandler;

pub(crate) fn with_platform_routes<R, L>(
    api: SchedulingApi<R, L>,
    handler: Arc<ReconciliationHandler<R, L>>,
) -> axum::Router
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    scheduling_router(api)
        .merge(webhook_router(handler))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
