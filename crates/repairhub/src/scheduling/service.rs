use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::notify::{Notification, NotificationKind, NotificationQueue, Recipient};

use super::audit::StatusEvent;
use super::budget::{self, Budget, BudgetError, BudgetOutcome, BudgetSubmission};
use super::domain::{
    Actor, Disapproval, Dispute, DisputeKind, InvoiceId, OrderId, OrderRequest, ScheduleStatus,
    SchedulingOrder, ServiceItemId,
};
use super::repository::{RepositoryError, SchedulingRepository, SettlementProbe};

/// Top-level state machine for scheduling orders. Every mutation from any
/// actor funnels through here: the current status is checked against the
/// transition graph, the write is applied with an optimistic guard, the
/// audit trail gets its events, and outbound notifications are enqueued.
pub struct SchedulingService<R> {
    repository: Arc<R>,
    settlement: Arc<dyn SettlementProbe>,
    notifications: Arc<NotificationQueue>,
}

static ORDER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_order_id() -> OrderId {
    let id = ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    OrderId(format!("ord-{id:06}"))
}

impl<R> SchedulingService<R>
where
    R: SchedulingRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        settlement: Arc<dyn SettlementProbe>,
        notifications: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            repository,
            settlement,
            notifications,
        }
    }

    /// Open a new engagement in `Requested`.
    pub fn create(&self, request: OrderRequest) -> Result<SchedulingOrder, SchedulingServiceError> {
        if request.requested_services.is_empty() {
            return Err(ValidationError::EmptyRequestedServices.into());
        }

        let order = SchedulingOrder::new(next_order_id(), request);
        let stored = self.repository.insert(order)?;
        self.repository.append_event(StatusEvent::record(
            &stored.id,
            ScheduleStatus::Requested,
            Actor::Customer,
            "repair request opened",
        ))?;
        self.notify(
            Recipient::Workshop(stored.workshop.clone()),
            NotificationKind::OrderRequested,
            &stored,
            &[],
        );
        info!(order = %stored.id.0, "scheduling order created");
        Ok(stored)
    }

    pub fn get(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        Ok(self.load(id)?)
    }

    pub fn events(
        &self,
        id: &OrderId,
    ) -> Result<Vec<StatusEvent>, SchedulingServiceError> {
        self.load(id)?;
        Ok(self.repository.events(id)?)
    }

    /// Workshop accepts the request, optionally proposing another date. The
    /// order moves straight on to `AwaitingBudget`.
    pub fn confirm(
        &self,
        id: &OrderId,
        suggested_date: Option<NaiveDate>,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::Requested)?;
        order.suggested_date = suggested_date;
        order.status = ScheduleStatus::AwaitingBudget;
        let events = vec![
            StatusEvent::record(
                &order.id,
                ScheduleStatus::Confirmed,
                Actor::Workshop,
                "workshop confirmed the request",
            ),
            StatusEvent::record(
                &order.id,
                ScheduleStatus::AwaitingBudget,
                Actor::System,
                "waiting for the workshop budget",
            ),
        ];
        let order = self.apply(order, ScheduleStatus::Requested, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::OrderConfirmed,
            &order,
            &[],
        );
        Ok(order)
    }

    /// Workshop declines the request. Terminal.
    pub fn refuse(
        &self,
        id: &OrderId,
        reason: &str,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::Requested)?;
        order.status = ScheduleStatus::Refused;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::Refused,
            Actor::Workshop,
            format!("workshop refused the request: {reason}"),
        )];
        let order = self.apply(order, ScheduleStatus::Requested, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::OrderRefused,
            &order,
            &[("reason", reason)],
        );
        Ok(order)
    }

    /// Workshop submits the itemized proposal built during diagnosis.
    pub fn submit_budget(
        &self,
        id: &OrderId,
        submission: BudgetSubmission,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        budget::validate_submission(&submission).map_err(ValidationError::Budget)?;

        let mut order = self.expect(id, ScheduleStatus::AwaitingBudget)?;
        order.budget = Some(Budget {
            diagnostic_fee: submission.diagnostic_fee,
            items: submission.items,
            estimated_hours: submission.estimated_hours,
            evidence_images: submission.evidence_images,
        });
        order.status = ScheduleStatus::BudgetSent;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::BudgetSent,
            Actor::Workshop,
            "itemized budget sent to the customer",
        )];
        let order = self.apply(order, ScheduleStatus::AwaitingBudget, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::BudgetReceived,
            &order,
            &[],
        );
        Ok(order)
    }

    /// Customer answers the budget by selecting the items to keep. An empty
    /// selection disapproves the whole budget; anything else computes the
    /// total once and advances to `AwaitingPayment`.
    pub fn resolve_budget(
        &self,
        id: &OrderId,
        approved_ids: &[ServiceItemId],
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::BudgetSent)?;
        let budget = order
            .budget
            .as_ref()
            .ok_or(ValidationError::NoBudgetSubmitted)?;

        let resolution = budget::resolve(budget, approved_ids).map_err(ValidationError::Budget)?;
        order.approved_services = resolution.approved;
        order.excluded_services = resolution.excluded;
        order.total_value = resolution.total_value;

        let mut events = Vec::new();
        match resolution.outcome {
            BudgetOutcome::Disapproved => {
                order.status = ScheduleStatus::BudgetDisapproved;
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::BudgetDisapproved,
                    Actor::Customer,
                    "customer declined every budget item",
                ));
            }
            BudgetOutcome::Approved | BudgetOutcome::PartiallyApproved => {
                let resolved = if resolution.outcome == BudgetOutcome::Approved {
                    ScheduleStatus::BudgetApproved
                } else {
                    ScheduleStatus::BudgetPartiallyApproved
                };
                order.budget_approved_at = Some(Utc::now());
                order.status = ScheduleStatus::AwaitingPayment;
                events.push(StatusEvent::record(
                    &order.id,
                    resolved,
                    Actor::Customer,
                    format!(
                        "customer kept {} of {} budget items",
                        order.approved_services.len(),
                        order.approved_services.len() + order.excluded_services.len(),
                    ),
                ));
                events.push(StatusEvent::record(
                    &order.id,
                    ScheduleStatus::AwaitingPayment,
                    Actor::System,
                    "settlement pending",
                ));
            }
        }

        let order = self.apply(order, ScheduleStatus::BudgetSent, events)?;
        self.notify(
            Recipient::Workshop(order.workshop.clone()),
            NotificationKind::BudgetResolved,
            &order,
            &[("outcome", order.status.label())],
        );
        Ok(order)
    }

    /// Attach the gateway charge identifier created by the settlement
    /// coordinator. Not a transition; the guard only protects against a
    /// concurrent status change.
    pub fn record_charge(
        &self,
        id: &OrderId,
        invoice: InvoiceId,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::AwaitingPayment)?;
        order.invoice = Some(invoice);
        self.apply(order, ScheduleStatus::AwaitingPayment, Vec::new())
    }

    /// Gateway (or coordinator, on a synchronous decline) reports that the
    /// charge failed.
    pub fn reject_payment(
        &self,
        id: &OrderId,
        message: &str,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::AwaitingPayment)?;
        order.status = ScheduleStatus::PaymentRejected;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::PaymentRejected,
            Actor::Gateway,
            format!("payment rejected: {message}"),
        )];
        let order = self.apply(order, ScheduleStatus::AwaitingPayment, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::PaymentRejected,
            &order,
            &[("message", message)],
        );
        Ok(order)
    }

    /// Customer re-initiates settlement after a rejection. The settlement
    /// coordinator reuses the same idempotency key afterwards.
    pub fn reopen_payment(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::PaymentRejected)?;
        order.status = ScheduleStatus::AwaitingPayment;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::AwaitingPayment,
            Actor::Customer,
            "payment re-attempted",
        )];
        self.apply(order, ScheduleStatus::PaymentRejected, events)
    }

    /// Gateway confirmed the money arrived.
    pub fn confirm_payment(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::AwaitingPayment)?;
        order.status = ScheduleStatus::PaymentConfirmed;
        order.paid_at = Some(Utc::now());
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::PaymentConfirmed,
            Actor::Gateway,
            "payment confirmed by the gateway",
        )];
        let order = self.apply(order, ScheduleStatus::AwaitingPayment, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::PaymentConfirmed,
            &order,
            &[],
        );
        self.notify(
            Recipient::Workshop(order.workshop.clone()),
            NotificationKind::PaymentConfirmed,
            &order,
            &[],
        );
        Ok(order)
    }

    pub fn start_service(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::PaymentConfirmed)?;
        order.status = ScheduleStatus::InProgress;
        order.service_started_at = Some(Utc::now());
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::InProgress,
            Actor::Workshop,
            "service execution started",
        )];
        let order = self.apply(order, ScheduleStatus::PaymentConfirmed, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::ServiceStarted,
            &order,
            &[],
        );
        Ok(order)
    }

    pub fn complete_service(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::InProgress)?;
        order.status = ScheduleStatus::AwaitingCompletionApproval;
        order.service_finished_at = Some(Utc::now());
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::AwaitingCompletionApproval,
            Actor::Workshop,
            "workshop marked the service as done",
        )];
        let order = self.apply(order, ScheduleStatus::InProgress, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::ServiceCompleted,
            &order,
            &[],
        );
        Ok(order)
    }

    /// Customer signs off on the finished work. Terminal.
    pub fn approve_completion(
        &self,
        id: &OrderId,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::AwaitingCompletionApproval)?;
        order.status = ScheduleStatus::Finished;
        let events = vec![
            StatusEvent::record(
                &order.id,
                ScheduleStatus::ServiceApproved,
                Actor::Customer,
                "customer approved the finished service",
            ),
            StatusEvent::record(
                &order.id,
                ScheduleStatus::Finished,
                Actor::System,
                "engagement finished",
            ),
        ];
        self.apply(order, ScheduleStatus::AwaitingCompletionApproval, events)
    }

    /// Customer rejects the finished work. Reason and evidence are required.
    pub fn disapprove_completion(
        &self,
        id: &OrderId,
        reason: &str,
        evidence_images: Vec<String>,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingDisapprovalReason.into());
        }
        if evidence_images.is_empty() {
            return Err(ValidationError::MissingDisapprovalEvidence.into());
        }

        let mut order = self.expect(id, ScheduleStatus::AwaitingCompletionApproval)?;
        order.disapproval = Some(Disapproval {
            reason: reason.to_string(),
            evidence_images,
        });
        order.status = ScheduleStatus::ServiceDisapproved;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::ServiceDisapproved,
            Actor::Customer,
            format!("customer disapproved the finished service: {reason}"),
        )];
        self.apply(order, ScheduleStatus::AwaitingCompletionApproval, events)
    }

    /// Escalate a disapproved budget or a disapproved completion into a
    /// formal dispute for an administrator to resolve.
    pub fn raise_dispute(
        &self,
        id: &OrderId,
        description: &str,
        evidence_images: Vec<String>,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        if description.trim().is_empty() {
            return Err(ValidationError::MissingDisputeDescription.into());
        }

        let mut order = self.load(id)?;
        let kind = match order.status {
            ScheduleStatus::BudgetDisapproved => DisputeKind::Budget,
            ScheduleStatus::ServiceDisapproved => DisputeKind::Completion,
            other => {
                return Err(ConflictError::UnsupportedTransition {
                    order: order.id.clone(),
                    from: other,
                    action: "raise_dispute",
                }
                .into())
            }
        };
        if order.open_dispute().is_some() {
            return Err(ValidationError::DisputeAlreadyOpen.into());
        }

        let previous = order.status;
        order.dispute = Some(Dispute {
            kind,
            description: description.to_string(),
            evidence_images,
            resolved: false,
        });
        order.status = ScheduleStatus::DisputeRaised;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::DisputeRaised,
            Actor::Customer,
            format!("dispute raised: {description}"),
        )];
        let order = self.apply(order, previous, events)?;
        self.notify(
            Recipient::Workshop(order.workshop.clone()),
            NotificationKind::DisputeOpened,
            &order,
            &[],
        );
        Ok(order)
    }

    /// Administrator takes the dispute for review.
    pub fn begin_admin_review(
        &self,
        id: &OrderId,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::DisputeRaised)?;
        order.status = ScheduleStatus::AwaitingAdminDecision;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::AwaitingAdminDecision,
            Actor::Admin,
            "dispute under administrative review",
        )];
        self.apply(order, ScheduleStatus::DisputeRaised, events)
    }

    /// Workshop offers to redo the disapproved work at no charge.
    pub fn offer_free_repair(
        &self,
        id: &OrderId,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.expect(id, ScheduleStatus::ServiceDisapproved)?;
        order.free_repair_pending = true;
        order.status = ScheduleStatus::AwaitingFreeRepairScheduling;
        let events = vec![StatusEvent::record(
            &order.id,
            ScheduleStatus::AwaitingFreeRepairScheduling,
            Actor::Workshop,
            "workshop offered a free repair",
        )];
        let order = self.apply(order, ScheduleStatus::ServiceDisapproved, events)?;
        self.notify(
            Recipient::Customer(order.customer.clone()),
            NotificationKind::FreeRepairOffered,
            &order,
            &[],
        );
        Ok(order)
    }

    /// Customer books the offered free repair: a fresh `Requested` order is
    /// opened, linked back to this one, and the original engagement closes.
    pub fn book_free_repair(
        &self,
        id: &OrderId,
        requested_date: NaiveDate,
    ) -> Result<(SchedulingOrder, SchedulingOrder), SchedulingServiceError> {
        let mut original = self.expect(id, ScheduleStatus::AwaitingFreeRepairScheduling)?;

        let mut rebooked = SchedulingOrder::new(
            next_order_id(),
            OrderRequest {
                customer: original.customer.clone(),
                workshop: original.workshop.clone(),
                vehicle: original.vehicle.clone(),
                requested_date,
                requested_services: original.requested_services.clone(),
            },
        );
        rebooked.free_repair = true;
        rebooked.linked_order = Some(original.id.clone());
        let rebooked = self.repository.insert(rebooked)?;
        self.repository.append_event(StatusEvent::record(
            &rebooked.id,
            ScheduleStatus::Requested,
            Actor::Customer,
            format!("free repair rebooking of {}", original.id.0),
        ))?;

        original.free_repair_pending = false;
        original.status = ScheduleStatus::Finished;
        let events = vec![StatusEvent::record(
            &original.id,
            ScheduleStatus::Finished,
            Actor::System,
            format!("free repair scheduled as {}", rebooked.id.0),
        )];
        let original = self.apply(
            original,
            ScheduleStatus::AwaitingFreeRepairScheduling,
            events,
        )?;

        Ok((original, rebooked))
    }

    /// Soft-disable an order. Refused while its settlement record is still
    /// in flight: the caller must resolve or wait out the charge first.
    pub fn cancel(&self, id: &OrderId) -> Result<SchedulingOrder, SchedulingServiceError> {
        let mut order = self.load(id)?;
        if self.settlement.settlement_active(&order.id) {
            return Err(ConflictError::SettlementActive {
                order: order.id.clone(),
            }
            .into());
        }
        let expected = order.status;
        order.disabled = true;
        let order = self.apply(order, expected, Vec::new())?;
        info!(order = %order.id.0, "scheduling order disabled");
        Ok(order)
    }

    fn load(&self, id: &OrderId) -> Result<SchedulingOrder, RepositoryError> {
        self.repository.fetch(id)?.ok_or(RepositoryError::NotFound)
    }

    /// Fetch and check the transition graph: the operation is legal only if
    /// the persisted status is exactly `expected`.
    fn expect(
        &self,
        id: &OrderId,
        expected: ScheduleStatus,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        let order = self.load(id)?;
        if order.status != expected {
            return Err(ConflictError::StatusMismatch {
                order: order.id.clone(),
                expected,
                actual: order.status,
            }
            .into());
        }
        Ok(order)
    }

    /// Persist a mutated order under the optimistic guard, then append the
    /// audit events. A concurrent writer surfaces as a status-mismatch
    /// conflict with the fresh persisted status.
    pub(crate) fn apply(
        &self,
        order: SchedulingOrder,
        expected: ScheduleStatus,
        events: Vec<StatusEvent>,
    ) -> Result<SchedulingOrder, SchedulingServiceError> {
        match self.repository.update_guarded(order.clone(), expected) {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => {
                let actual = self
                    .repository
                    .fetch(&order.id)?
                    .map(|current| current.status)
                    .unwrap_or(order.status);
                return Err(ConflictError::StatusMismatch {
                    order: order.id.clone(),
                    expected,
                    actual,
                }
                .into());
            }
            Err(other) => return Err(other.into()),
        }

        for event in events {
            info!(
                order = %event.order.0,
                status = event.status.label(),
                actor = event.actor.label(),
                "status transition recorded"
            );
            self.repository.append_event(event)?;
        }
        Ok(order)
    }

    pub(crate) fn notify(
        &self,
        recipient: Recipient,
        kind: NotificationKind,
        order: &SchedulingOrder,
        details: &[(&str, &str)],
    ) {
        let details: BTreeMap<String, String> = details
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.notifications.enqueue(Notification {
            recipient,
            kind,
            order: Some(order.id.clone()),
            details,
        });
    }
}

/// Synchronous input rejections; the order is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("a request must name at least one service")]
    EmptyRequestedServices,
    #[error("no budget has been submitted for this order")]
    NoBudgetSubmitted,
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error("disapproving a finished service requires a reason")]
    MissingDisapprovalReason,
    #[error("disapproving a finished service requires evidence images")]
    MissingDisapprovalEvidence,
    #[error("a dispute requires a description")]
    MissingDisputeDescription,
    #[error("an open dispute already exists for this order")]
    DisputeAlreadyOpen,
    #[error("no open dispute exists for this order")]
    NoOpenDispute,
    #[error("a partial admin approval must keep at least one service")]
    EmptyAdminSelection,
}

/// Expected-state mismatches; the caller should re-fetch and retry.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("order {order} is {actual}, expected {expected}")]
    StatusMismatch {
        order: OrderId,
        expected: ScheduleStatus,
        actual: ScheduleStatus,
    },
    #[error("action '{action}' is not allowed while order {order} is {from}")]
    UnsupportedTransition {
        order: OrderId,
        from: ScheduleStatus,
        action: &'static str,
    },
    #[error("order {order} has an active settlement")]
    SettlementActive { order: OrderId },
}

/// Error raised by the scheduling service.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
