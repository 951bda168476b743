use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::budget::Budget;

/// Identifier wrapper for scheduling orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkshopId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub String);

/// Identifier of one priced line item inside a budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceItemId(pub String);

/// External invoice/charge identifier assigned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

/// Every state a scheduling order can occupy. `Requested` is initial;
/// `Refused` and `Finished` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Requested,
    Refused,
    Confirmed,
    AwaitingBudget,
    BudgetSent,
    BudgetApproved,
    BudgetPartiallyApproved,
    BudgetDisapproved,
    AwaitingPayment,
    PaymentRejected,
    PaymentConfirmed,
    InProgress,
    AwaitingCompletionApproval,
    ServiceApproved,
    ServiceDisapproved,
    DisputeRaised,
    AwaitingAdminDecision,
    AwaitingFreeRepairScheduling,
    Finished,
}

impl ScheduleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScheduleStatus::Requested => "requested",
            ScheduleStatus::Refused => "refused",
            ScheduleStatus::Confirmed => "confirmed",
            ScheduleStatus::AwaitingBudget => "awaiting_budget",
            ScheduleStatus::BudgetSent => "budget_sent",
            ScheduleStatus::BudgetApproved => "budget_approved",
            ScheduleStatus::BudgetPartiallyApproved => "budget_partially_approved",
            ScheduleStatus::BudgetDisapproved => "budget_disapproved",
            ScheduleStatus::AwaitingPayment => "awaiting_payment",
            ScheduleStatus::PaymentRejected => "payment_rejected",
            ScheduleStatus::PaymentConfirmed => "payment_confirmed",
            ScheduleStatus::InProgress => "in_progress",
            ScheduleStatus::AwaitingCompletionApproval => "awaiting_completion_approval",
            ScheduleStatus::ServiceApproved => "service_approved",
            ScheduleStatus::ServiceDisapproved => "service_disapproved",
            ScheduleStatus::DisputeRaised => "dispute_raised",
            ScheduleStatus::AwaitingAdminDecision => "awaiting_admin_decision",
            ScheduleStatus::AwaitingFreeRepairScheduling => "awaiting_free_repair_scheduling",
            ScheduleStatus::Finished => "finished",
        }
    }

    /// Display bucket for the status. Explicit per-state mapping; a new
    /// state added to the enum forces a decision here instead of silently
    /// falling into a numeric range.
    pub const fn group(self) -> StatusGroup {
        match self {
            ScheduleStatus::Requested | ScheduleStatus::Confirmed => StatusGroup::Intake,
            ScheduleStatus::AwaitingBudget
            | ScheduleStatus::BudgetSent
            | ScheduleStatus::BudgetApproved
            | ScheduleStatus::BudgetPartiallyApproved
            | ScheduleStatus::BudgetDisapproved => StatusGroup::Negotiation,
            ScheduleStatus::AwaitingPayment
            | ScheduleStatus::PaymentRejected
            | ScheduleStatus::PaymentConfirmed => StatusGroup::Payment,
            ScheduleStatus::InProgress
            | ScheduleStatus::AwaitingFreeRepairScheduling => StatusGroup::Execution,
            ScheduleStatus::AwaitingCompletionApproval
            | ScheduleStatus::ServiceApproved
            | ScheduleStatus::ServiceDisapproved => StatusGroup::Review,
            ScheduleStatus::DisputeRaised | ScheduleStatus::AwaitingAdminDecision => {
                StatusGroup::Dispute
            }
            ScheduleStatus::Refused | ScheduleStatus::Finished => StatusGroup::Closed,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ScheduleStatus::Refused | ScheduleStatus::Finished)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse display grouping used in listings and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusGroup {
    Intake,
    Negotiation,
    Payment,
    Execution,
    Review,
    Dispute,
    Closed,
}

impl StatusGroup {
    pub const fn label(self) -> &'static str {
        match self {
            StatusGroup::Intake => "intake",
            StatusGroup::Negotiation => "negotiation",
            StatusGroup::Payment => "payment",
            StatusGroup::Execution => "execution",
            StatusGroup::Review => "review",
            StatusGroup::Dispute => "dispute",
            StatusGroup::Closed => "closed",
        }
    }
}

/// Who caused a transition. Admin actions must stay distinguishable from
/// customer/workshop ones in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Workshop,
    Gateway,
    Admin,
    System,
}

impl Actor {
    pub const fn label(self) -> &'static str {
        match self {
            Actor::Customer => "customer",
            Actor::Workshop => "workshop",
            Actor::Gateway => "gateway",
            Actor::Admin => "admin",
            Actor::System => "system",
        }
    }
}

/// What a raised dispute contests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeKind {
    Budget,
    Completion,
}

/// A formal contestation. At most one is open per order at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub kind: DisputeKind,
    pub description: String,
    pub evidence_images: Vec<String>,
    pub resolved: bool,
}

/// Customer rejection of a completed service; reason and evidence are
/// mandatory before it is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disapproval {
    pub reason: String,
    pub evidence_images: Vec<String>,
}

/// Inbound payload creating a new scheduling order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer: CustomerId,
    pub workshop: WorkshopId,
    pub vehicle: VehicleId,
    pub requested_date: NaiveDate,
    pub requested_services: Vec<String>,
}

/// Aggregate root for one repair-service engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingOrder {
    pub id: OrderId,
    pub customer: CustomerId,
    pub workshop: WorkshopId,
    pub vehicle: VehicleId,
    pub requested_date: NaiveDate,
    pub suggested_date: Option<NaiveDate>,
    pub status: ScheduleStatus,
    pub requested_services: Vec<String>,
    pub budget: Option<Budget>,
    /// Items the customer (or an admin override) kept.
    pub approved_services: Vec<ServiceItemId>,
    /// Items excluded at resolution time. Retained for audit and financial
    /// reporting, never discarded.
    pub excluded_services: Vec<ServiceItemId>,
    /// Admin-chosen subset, recorded separately from the customer's own
    /// selection so both stay auditable.
    pub admin_approved_services: Vec<ServiceItemId>,
    pub total_value: Option<Decimal>,
    pub budget_approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub service_started_at: Option<DateTime<Utc>>,
    pub service_finished_at: Option<DateTime<Utc>>,
    pub disapproval: Option<Disapproval>,
    pub dispute: Option<Dispute>,
    pub free_repair: bool,
    pub free_repair_pending: bool,
    pub admin_override: bool,
    /// For free-repair orders, the engagement they redo.
    pub linked_order: Option<OrderId>,
    pub invoice: Option<InvoiceId>,
    pub disabled: bool,
}

impl SchedulingOrder {
    pub fn new(id: OrderId, request: OrderRequest) -> Self {
        Self {
            id,
            customer: request.customer,
            workshop: request.workshop,
            vehicle: request.vehicle,
            requested_date: request.requested_date,
            suggested_date: None,
            status: ScheduleStatus::Requested,
            requested_services: request.requested_services,
            budget: None,
            approved_services: Vec::new(),
            excluded_services: Vec::new(),
            admin_approved_services: Vec::new(),
            total_value: None,
            budget_approved_at: None,
            paid_at: None,
            service_started_at: None,
            service_finished_at: None,
            disapproval: None,
            dispute: None,
            free_repair: false,
            free_repair_pending: false,
            admin_override: false,
            linked_order: None,
            invoice: None,
            disabled: false,
        }
    }

    pub fn open_dispute(&self) -> Option<&Dispute> {
        self.dispute.as_ref().filter(|dispute| !dispute.resolved)
    }

    pub fn status_view(&self) -> OrderStatusView {
        OrderStatusView {
            order_id: self.id.0.clone(),
            status: self.status.label(),
            group: self.status.group().label(),
            total_value: self.total_value,
            free_repair: self.free_repair,
            admin_override: self.admin_override,
            invoice: self.invoice.as_ref().map(|invoice| invoice.0.clone()),
            disabled: self.disabled,
        }
    }
}

/// Sanitized representation of an order's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: String,
    pub status: &'static str,
    pub group: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Decimal>,
    pub free_repair: bool,
    pub admin_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<String>,
    pub disabled: bool,
}
