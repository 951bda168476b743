//! Outbound notification queue.
//!
//! State transitions enqueue messages here instead of calling mail/push
//! senders inline: enqueueing never fails, so a committed transition cannot
//! be rolled back by a notification problem. A drain pass hands pending
//! messages to a [`NotificationSender`]; messages whose send fails are
//! requeued, giving at-least-once delivery toward the external sender.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::scheduling::domain::{CustomerId, OrderId, WorkshopId};

/// Who a queued message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Customer(CustomerId),
    Workshop(WorkshopId),
    /// Operational alerts for the support desk (reconciliation anomalies).
    Support,
}

/// Message categories; each maps to a delivery template downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderRequested,
    OrderConfirmed,
    OrderRefused,
    BudgetReceived,
    BudgetResolved,
    PaymentConfirmed,
    PaymentRejected,
    ServiceStarted,
    ServiceCompleted,
    DisputeOpened,
    AdminDecision,
    FreeRepairOffered,
    SupportAlert,
}

impl NotificationKind {
    pub const fn template(self) -> &'static str {
        match self {
            NotificationKind::OrderRequested => "order_requested",
            NotificationKind::OrderConfirmed => "order_confirmed",
            NotificationKind::OrderRefused => "order_refused",
            NotificationKind::BudgetReceived => "budget_received",
            NotificationKind::BudgetResolved => "budget_resolved",
            NotificationKind::PaymentConfirmed => "payment_confirmed",
            NotificationKind::PaymentRejected => "payment_rejected",
            NotificationKind::ServiceStarted => "service_started",
            NotificationKind::ServiceCompleted => "service_completed",
            NotificationKind::DisputeOpened => "dispute_opened",
            NotificationKind::AdminDecision => "admin_decision",
            NotificationKind::FreeRepairOffered => "free_repair_offered",
            NotificationKind::SupportAlert => "support_alert",
        }
    }
}

/// One queued outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub order: Option<OrderId>,
    pub details: BTreeMap<String, String>,
}

/// Transport seam for mail/push delivery.
pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Result of one drain pass over the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
}

/// In-process queue decoupling transitions from delivery.
#[derive(Default)]
pub struct NotificationQueue {
    pending: Mutex<VecDeque<Notification>>,
}

impl NotificationQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a message. Infallible so callers never branch on it.
    pub fn enqueue(&self, notification: Notification) {
        let mut guard = self.pending.lock().expect("notification mutex poisoned");
        guard.push_back(notification);
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .expect("notification mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current queue contents, oldest first. Used by tests and diagnostics.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.pending
            .lock()
            .expect("notification mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Deliver everything currently queued. Failed sends go back to the end
    /// of the queue for the next pass (at-least-once toward the sender).
    pub fn drain(&self, sender: &dyn NotificationSender) -> DrainReport {
        let batch: Vec<Notification> = {
            let mut guard = self.pending.lock().expect("notification mutex poisoned");
            guard.drain(..).collect()
        };

        let mut report = DrainReport::default();
        for notification in batch {
            match sender.send(&notification) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        template = notification.kind.template(),
                        error = %err,
                        "notification delivery failed, requeueing"
                    );
                    self.enqueue(notification);
                    report.requeued += 1;
                }
            }
        }
        report
    }
}
