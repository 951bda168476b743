use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::settlement::coordinator::{SettlementCoordinator, SettlementError, SettlementOutcome};
use crate::settlement::gateway::{GatewayError, PaymentMethod};
use crate::settlement::ledger::LedgerRepository;

use super::admin::AdminDecision;
use super::budget::BudgetSubmission;
use super::domain::{OrderId, OrderRequest, ScheduleStatus, ServiceItemId};
use super::repository::{RepositoryError, SchedulingRepository};
use super::service::{SchedulingService, SchedulingServiceError};

/// Shared state for the order-facing routes: the lifecycle service plus the
/// settlement coordinator it hands approved budgets to.
pub struct SchedulingApi<R, L> {
    pub scheduling: Arc<SchedulingService<R>>,
    pub settlement: Arc<SettlementCoordinator<L>>,
}

impl<R, L> Clone for SchedulingApi<R, L> {
    fn clone(&self) -> Self {
        Self {
            scheduling: self.scheduling.clone(),
            settlement: self.settlement.clone(),
        }
    }
}

/// Router builder exposing the full lifecycle surface.
pub fn scheduling_router<R, L>(api: SchedulingApi<R, L>) -> Router
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    Router::new()
        .route("/api/v1/orders", post(create_handler::<R, L>))
        .route(
            "/api/v1/orders/:order_id",
            get(status_handler::<R, L>).delete(cancel_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/confirmation",
            post(confirm_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/refusal",
            post(refuse_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/budget",
            post(submit_budget_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/budget/resolution",
            post(resolve_budget_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/payment/retry",
            post(retry_payment_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/settlement",
            get(settlement_view_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/start",
            post(start_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/completion",
            post(complete_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/completion/approval",
            post(approve_completion_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/completion/disapproval",
            post(disapprove_completion_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/dispute",
            post(dispute_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/free-repair/offer",
            post(offer_free_repair_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/free-repair/booking",
            post(book_free_repair_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/admin/review",
            post(admin_review_handler::<R, L>),
        )
        .route(
            "/api/v1/orders/:order_id/admin/decision",
            post(admin_decision_handler::<R, L>),
        )
        .with_state(api)
}

fn scheduling_error_response(error: SchedulingServiceError) -> Response {
    let payload = json!({ "error": error.to_string() });
    let status = match &error {
        SchedulingServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SchedulingServiceError::Conflict(_) => StatusCode::CONFLICT,
        SchedulingServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        SchedulingServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        SchedulingServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, axum::Json(payload)).into_response()
}

fn settlement_error_response(error: SettlementError) -> Response {
    match error {
        SettlementError::Scheduling(inner) => scheduling_error_response(inner),
        SettlementError::MissingTotal => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        SettlementError::NoRecord => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        SettlementError::Gateway(GatewayError::Timeout)
        | SettlementError::Gateway(GatewayError::Transport(_)) => (
            StatusCode::BAD_GATEWAY,
            axum::Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": other.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn create_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    axum::Json(request): axum::Json<OrderRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.create(request) {
        Ok(order) => (StatusCode::CREATED, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn status_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let id = OrderId(order_id);
    let order = match api.scheduling.get(&id) {
        Ok(order) => order,
        Err(error) => return scheduling_error_response(error),
    };
    let events = match api.scheduling.events(&id) {
        Ok(events) => events,
        Err(error) => return scheduling_error_response(error),
    };
    let payload = json!({
        "order": order.status_view(),
        "history": events,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfirmRequest {
    #[serde(default)]
    pub(crate) suggested_date: Option<NaiveDate>,
}

pub(crate) async fn confirm_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<ConfirmRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api
        .scheduling
        .confirm(&OrderId(order_id), request.suggested_date)
    {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefuseRequest {
    pub(crate) reason: String,
}

pub(crate) async fn refuse_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<RefuseRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.refuse(&OrderId(order_id), &request.reason) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn submit_budget_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(submission): axum::Json<BudgetSubmission>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.submit_budget(&OrderId(order_id), submission) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveBudgetRequest {
    pub(crate) approved_services: Vec<String>,
    #[serde(default = "default_payment_method")]
    pub(crate) method: PaymentMethod,
    #[serde(default = "default_installments")]
    pub(crate) installments: u32,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::CreditCard
}

fn default_installments() -> u32 {
    1
}

pub(crate) async fn resolve_budget_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<ResolveBudgetRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let id = OrderId(order_id);
    let approved: Vec<ServiceItemId> = request
        .approved_services
        .into_iter()
        .map(ServiceItemId)
        .collect();

    let order = match api.scheduling.resolve_budget(&id, &approved) {
        Ok(order) => order,
        Err(error) => return scheduling_error_response(error),
    };

    if order.status != ScheduleStatus::AwaitingPayment {
        return (StatusCode::OK, axum::Json(order.status_view())).into_response();
    }

    match api
        .settlement
        .settle(&api.scheduling, &id, request.method, request.installments)
    {
        Ok(outcome) => settlement_response(&api, &id, outcome),
        Err(error) => settlement_error_response(error),
    }
}

pub(crate) async fn retry_payment_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<RetryPaymentRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let id = OrderId(order_id);
    if let Err(error) = api.scheduling.reopen_payment(&id) {
        return scheduling_error_response(error);
    }
    match api
        .settlement
        .settle(&api.scheduling, &id, request.method, request.installments)
    {
        Ok(outcome) => settlement_response(&api, &id, outcome),
        Err(error) => settlement_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetryPaymentRequest {
    #[serde(default = "default_payment_method")]
    pub(crate) method: PaymentMethod,
    #[serde(default = "default_installments")]
    pub(crate) installments: u32,
}

fn settlement_response<R, L>(
    api: &SchedulingApi<R, L>,
    id: &OrderId,
    outcome: SettlementOutcome,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let order = match api.scheduling.get(id) {
        Ok(order) => order,
        Err(error) => return scheduling_error_response(error),
    };
    let settlement = match outcome {
        SettlementOutcome::Charged(record) => json!({
            "result": "charged",
            "invoice": record.invoice.0,
            "gross_value": record.gross_value,
        }),
        SettlementOutcome::AlreadyCharged(record) => json!({
            "result": "already_charged",
            "invoice": record.invoice.0,
        }),
        SettlementOutcome::Declined { message } => json!({
            "result": "declined",
            "message": message,
        }),
    };
    let payload = json!({
        "order": order.status_view(),
        "settlement": settlement,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn settlement_view_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let id = OrderId(order_id);
    let snapshot = match api.settlement.lookup(&id) {
        Ok(snapshot) => snapshot,
        Err(error) => return settlement_error_response(error),
    };
    let payload = json!({
        "invoice": snapshot.invoice.0,
        "paid": snapshot.paid,
        "paid_at": snapshot.paid_at,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn start_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.start_service(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn complete_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.complete_service(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn approve_completion_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.approve_completion(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DisapprovalRequest {
    pub(crate) reason: String,
    #[serde(default)]
    pub(crate) evidence_images: Vec<String>,
}

pub(crate) async fn disapprove_completion_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<DisapprovalRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.disapprove_completion(
        &OrderId(order_id),
        &request.reason,
        request.evidence_images,
    ) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DisputeRequest {
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) evidence_images: Vec<String>,
}

pub(crate) async fn dispute_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<DisputeRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.raise_dispute(
        &OrderId(order_id),
        &request.description,
        request.evidence_images,
    ) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn offer_free_repair_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.offer_free_repair(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FreeRepairBookingRequest {
    pub(crate) requested_date: NaiveDate,
}

pub(crate) async fn book_free_repair_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(request): axum::Json<FreeRepairBookingRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api
        .scheduling
        .book_free_repair(&OrderId(order_id), request.requested_date)
    {
        Ok((original, rebooked)) => {
            let payload = json!({
                "order": original.status_view(),
                "free_repair_order": rebooked.status_view(),
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn admin_review_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.begin_admin_review(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}

pub(crate) async fn admin_decision_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
    axum::Json(decision): axum::Json<AdminDecision>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    let id = OrderId(order_id);
    let outcome = match api.scheduling.apply_admin_decision(&id, decision) {
        Ok(outcome) => outcome,
        Err(error) => return scheduling_error_response(error),
    };

    let refund = match outcome.refund_due {
        Some(amount) => match api.settlement.refund(&id, amount) {
            Ok(record) => json!({
                "amount": amount,
                "reversed_total": record.reversed_value,
            }),
            Err(error) => return settlement_error_response(error),
        },
        None => serde_json::Value::Null,
    };

    let payload = json!({
        "order": outcome.order.status_view(),
        "refund": refund,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn cancel_handler<R, L>(
    State(api): State<SchedulingApi<R, L>>,
    Path(order_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    match api.scheduling.cancel(&OrderId(order_id)) {
        Ok(order) => (StatusCode::OK, axum::Json(order.status_view())).into_response(),
        Err(error) => scheduling_error_response(error),
    }
}
