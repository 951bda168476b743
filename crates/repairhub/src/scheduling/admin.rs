//! Administrative resolution of disputes.
//!
//! Budget disputes re-enter the payment path; completion disputes close the
//! engagement, with the non-approved portion of an already-settled charge
//! surfaced as a refund for the settlement coordinator to execute.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_fiscal;
use crate::notify::{NotificationKind, Recipient};

use super::audit::StatusEvent;
use super::budget::{self, BudgetError};
use super::domain::{Actor, DisputeKind, OrderId, ScheduleStatus, SchedulingOrder, ServiceItemId};
use super::repository::SchedulingRepository;
use super::service::{ConflictError, SchedulingService, SchedulingServiceError, ValidationError};

/// The administrator's ruling over a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdminDecision {
    /// Every disputed service counts.
    Approve,
    /// Only the listed services count; recorded separately from the
    /// customer's own selection.
    ApprovePartial { services: Vec<ServiceItemId> },
    /// The dispute is upheld against the workshop.
    Reject,
}

/// Result of applying an admin decision. `refund_due` is set when an
/// already-collected charge must be partially or fully reversed; executing
/// that reversal is the settlement coordinator's job.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminOutcome {
    pub order: SchedulingOrder,
    pub refund_due: Option<Decimal>,
}

impl<R> SchedulingService<R>
where
    R: SchedulingRepository + 'static,
{
    /// Apply the administrator's ruling to an order under review.
    pub fn apply_admin_decision(
        &self,
        id: &OrderId,
        decision: AdminDecision,
    ) -> Result<AdminOutcome, SchedulingServiceError> {
        let order = self.get(id)?;
        if order.status != ScheduleStatus::AwaitingAdminDecision {
            return Err(ConflictError::StatusMismatch {
                order: order.id.clone(),
                expected: ScheduleStatus::AwaitingAdminDecision,
                actual: order.status,
            }
            .into());
        }
        let kind = match order.open_dispute() {
            Some(dispute) => dispute.kind,
            None => return Err(ValidationError::NoOpenDispute.into()),
        };

        match kind {
            DisputeKind::Budget => self.decide_budget_dispute(order, decision),
            DisputeKind::Completion => self.decide_completion_dispute(order, decision),
        }
    }

    fn decide_budget_dispute(
        &self,
        mut order: SchedulingOrder,
        decision: AdminDecision,
    ) -> Result<AdminOutcome, SchedulingServiceError> {
        let budget = order
            .budget
            .clone()
            .ok_or(ValidationError::NoBudgetSubmitted)?;

        let mut events = Vec::new();
        match decision {
            AdminDecision::Approve => {
                let all: Vec<ServiceItemId> =
                    budget.items.iter().map(|item| item.id.clone()).collect();
                order.total_value = Some(budget.total_for(&all));
                order.admin_approved_services = all.clone();
                order.approved_services = all;
                order.excluded_services.clear();
                order.admin_override = true;
                order.budget_approved_at = Some(Utc::now());
                order.status = ScheduleStatus::AwaitingPayment;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::BudgetApproved,
                    Actor::Admin,
                    "administrator approved the full budget",
                ));
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::AwaitingPayment,
                    Actor::System,
                    "settlement pending after admin ruling",
                ));
            }
            AdminDecision::ApprovePartial { services } => {
                if services.is_empty() {
                    return Err(ValidationError::EmptyAdminSelection.into());
                }
                let resolution =
                    budget::resolve(&budget, &services).map_err(ValidationError::Budget)?;
                order.total_value = resolution.total_value;
                order.approved_services = resolution.approved;
                order.excluded_services = resolution.excluded;
                order.admin_approved_services = services;
                order.admin_override = true;
                order.budget_approved_at = Some(Utc::now());
                order.status = ScheduleStatus::AwaitingPayment;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::BudgetPartiallyApproved,
                    Actor::Admin,
                    "administrator approved a subset of the budget",
                ));
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::AwaitingPayment,
                    Actor::System,
                    "settlement pending after admin ruling",
                ));
            }
            AdminDecision::Reject => {
                order.status = ScheduleStatus::BudgetDisapproved;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::BudgetDisapproved,
                    Actor::Admin,
                    "administrator rejected the dispute",
                ));
            }
        }

        if let Some(dispute) = order.dispute.as_mut() {
            dispute.resolved = true;
        }
        let order = self.apply(order, ScheduleStatus::AwaitingAdminDecision, events)?;
        self.notify_admin_outcome(&order);
        Ok(AdminOutcome {
            order,
            refund_due: None,
        })
    }

    fn decide_completion_dispute(
        &self,
        mut order: SchedulingOrder,
        decision: AdminDecision,
    ) -> Result<AdminOutcome, SchedulingServiceError> {
        let collected = order.total_value.unwrap_or(Decimal::ZERO);
        let mut events = Vec::new();
        let refund_due = match decision {
            AdminDecision::Approve => {
                order.status = ScheduleStatus::Finished;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::Finished,
                    Actor::Admin,
                    "administrator upheld the workshop in full",
                ));
                None
            }
            AdminDecision::ApprovePartial { services } => {
                if services.is_empty() {
                    return Err(ValidationError::EmptyAdminSelection.into());
                }
                let budget = order
                    .budget
                    .clone()
                    .ok_or(ValidationError::NoBudgetSubmitted)?;
                for id in &services {
                    if budget.item(id).is_none() {
                        return Err(
                            ValidationError::Budget(BudgetError::UnknownItem(id.0.clone())).into()
                        );
                    }
                }
                let kept = budget.total_for(&services);
                let reversal = round_fiscal(collected - kept);
                order.admin_approved_services = services;
                order.admin_override = true;
                order.status = ScheduleStatus::Finished;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::Finished,
                    Actor::Admin,
                    "administrator upheld part of the disputed services",
                ));
                (reversal > Decimal::ZERO).then_some(reversal)
            }
            AdminDecision::Reject => {
                order.status = ScheduleStatus::BudgetDisapproved;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::BudgetDisapproved,
                    Actor::Admin,
                    "administrator upheld the customer; charge to be reversed",
                ));
                (collected > Decimal::ZERO).then_some(collected)
            }
        };

        if let Some(dispute) = order.dispute.as_mut() {
            dispute.resolved = true;
        }
        let order = self.apply(order, ScheduleStatus::AwaitingAdminDecision, events)?;
        self.notify_admin_outcome(&order);
        Ok(AdminOutcome { order, refund_due })
    }

    fn notify_admin_outcome(&self, order: &SchedulingOrder) {
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::AdminDecision,
            order,
            &[("status", order.status.label())],
        );
        self.notify(
            Recipient::Workshop(order.workshop.clone()),
            NotificationKind::AdminDecision,
            order,
            &[("status", order.status.label())],
        );
    }
}
