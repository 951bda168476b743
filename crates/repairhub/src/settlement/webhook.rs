//! Webhook reconciliation: applying asynchronous gateway events to the
//! ledger and the scheduling lifecycle.
//!
//! Events arrive out of order and may be replayed; the handler checks the
//! ledger's current payment status before mutating anything, so reapplying
//! an already-applied terminal event is a no-op. Lookup is by the external
//! invoice id because that is all the gateway knows. An event for an
//! unknown invoice is acknowledged, logged, and escalated to support, never
//! failed back to the gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::directory::WorkshopDirectory;
use crate::notify::{Notification, NotificationKind, NotificationQueue, Recipient};
use crate::scheduling::domain::{InvoiceId, ScheduleStatus, WorkshopId};
use crate::scheduling::repository::SchedulingRepository;
use crate::scheduling::service::{SchedulingService, SchedulingServiceError};

use super::ledger::{FinancialRecord, LedgerError, LedgerRepository, PaymentStatus};

/// Terminal sub-status carried by an `invoice-status-changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceTerminalStatus {
    Paid,
    Expired,
    Canceled,
}

/// The event kinds the gateway delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum GatewayEvent {
    InvoiceStatusChanged {
        invoice: String,
        status: InvoiceTerminalStatus,
    },
    InvoiceReleased {
        invoice: String,
    },
    PaymentFailed {
        invoice: String,
        #[serde(default)]
        message: Option<String>,
    },
    CounterpartVerification {
        workshop: String,
        approved: bool,
    },
}

/// Full webhook payload: deployment key plus the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub project: String,
    #[serde(flatten)]
    pub event: GatewayEvent,
}

/// What happened to an inbound event. Everything here is acknowledged with
/// success to the gateway; only infrastructure failures bubble as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadyApplied,
    /// Event addressed to a different deployed project.
    ForeignProject,
    /// No matching settlement record; dropped after a support alert.
    UnknownInvoice,
    /// Counterpart verification applied to the workshop record.
    WorkshopUpdated,
    /// Verification for a workshop the directory does not know.
    UnknownWorkshop,
}

/// Infrastructure failure while reconciling; the gateway should retry.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingServiceError),
    #[error("directory unavailable: {0}")]
    Directory(String),
}

pub struct ReconciliationHandler<R, L> {
    scheduling: Arc<SchedulingService<R>>,
    ledger: Arc<L>,
    directory: Arc<dyn WorkshopDirectory>,
    notifications: Arc<NotificationQueue>,
    project: String,
}

impl<R, L> ReconciliationHandler<R, L>
where
    R: SchedulingRepository + 'static,
    L: LedgerRepository + 'static,
{
    pub fn new(
        scheduling: Arc<SchedulingService<R>>,
        ledger: Arc<L>,
        directory: Arc<dyn WorkshopDirectory>,
        notifications: Arc<NotificationQueue>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            scheduling,
            ledger,
            directory,
            notifications,
            project: project.into(),
        }
    }

    /// Apply one inbound event idempotently.
    pub fn handle(&self, envelope: WebhookEnvelope) -> Result<WebhookOutcome, ReconciliationError> {
        if envelope.project != self.project {
            info!(project = %envelope.project, "event for another project, acknowledged as no-op");
            return Ok(WebhookOutcome::ForeignProject);
        }

        match envelope.event {
            GatewayEvent::InvoiceStatusChanged { invoice, status } => {
                self.on_invoice_status(&InvoiceId(invoice), status)
            }
            GatewayEvent::InvoiceReleased { invoice } => self.on_released(&InvoiceId(invoice)),
            GatewayEvent::PaymentFailed { invoice, message } => self.on_payment_failed(
                &InvoiceId(invoice),
                message.as_deref().unwrap_or("payment failed"),
            ),
            GatewayEvent::CounterpartVerification { workshop, approved } => {
                self.on_counterpart_verification(&WorkshopId(workshop), approved)
            }
        }
    }

    fn on_invoice_status(
        &self,
        invoice: &InvoiceId,
        status: InvoiceTerminalStatus,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        let Some(record) = self.lookup(invoice)? else {
            return Ok(self.unknown_invoice(invoice));
        };

        match status {
            InvoiceTerminalStatus::Paid => self.mark_paid(record),
            InvoiceTerminalStatus::Expired => {
                self.mark_lapsed(record, PaymentStatus::Expired, "invoice expired")
            }
            InvoiceTerminalStatus::Canceled => {
                self.mark_lapsed(record, PaymentStatus::Canceled, "invoice canceled")
            }
        }
    }

    fn mark_paid(&self, mut record: FinancialRecord) -> Result<WebhookOutcome, ReconciliationError> {
        if matches!(
            record.status,
            PaymentStatus::Paid | PaymentStatus::Released
        ) {
            return Ok(WebhookOutcome::AlreadyApplied);
        }

        record.status = PaymentStatus::Paid;
        record.paid_at = Some(Utc::now());
        self.ledger.update(record.clone())?;
        self.confirm_order_payment(&record)?;
        Ok(WebhookOutcome::Applied)
    }

    fn mark_lapsed(
        &self,
        mut record: FinancialRecord,
        status: PaymentStatus,
        reason: &str,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        if record.status == status {
            return Ok(WebhookOutcome::AlreadyApplied);
        }

        record.status = status;
        record.expired_at = Some(Utc::now());
        self.ledger.update(record.clone())?;

        let order = self.scheduling.get(&record.order)?;
        if order.status == ScheduleStatus::AwaitingPayment {
            self.scheduling.reject_payment(&record.order, reason)?;
        }
        Ok(WebhookOutcome::Applied)
    }

    /// Funds released for payout. Release can outrun the paid event; if the
    /// money was never marked paid locally, the release implies it.
    fn on_released(&self, invoice: &InvoiceId) -> Result<WebhookOutcome, ReconciliationError> {
        let Some(mut record) = self.lookup(invoice)? else {
            return Ok(self.unknown_invoice(invoice));
        };

        if record.status == PaymentStatus::Released {
            return Ok(WebhookOutcome::AlreadyApplied);
        }

        if record.paid_at.is_none() {
            record.paid_at = Some(Utc::now());
        }
        record.status = PaymentStatus::Released;
        record.released_at = Some(Utc::now());
        self.ledger.update(record.clone())?;
        self.confirm_order_payment(&record)?;
        Ok(WebhookOutcome::Applied)
    }

    fn on_payment_failed(
        &self,
        invoice: &InvoiceId,
        message: &str,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        let Some(mut record) = self.lookup(invoice)? else {
            return Ok(self.unknown_invoice(invoice));
        };

        if record.status == PaymentStatus::Rejected {
            return Ok(WebhookOutcome::AlreadyApplied);
        }

        record.status = PaymentStatus::Rejected;
        self.ledger.update(record.clone())?;

        let order = self.scheduling.get(&record.order)?;
        if order.status == ScheduleStatus::AwaitingPayment {
            self.scheduling.reject_payment(&record.order, message)?;
        }
        Ok(WebhookOutcome::Applied)
    }

    fn on_counterpart_verification(
        &self,
        workshop: &WorkshopId,
        approved: bool,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        match self.directory.set_bank_verified(workshop, approved) {
            Ok(()) => {
                info!(workshop = %workshop.0, approved, "workshop bank verification updated");
                Ok(WebhookOutcome::WorkshopUpdated)
            }
            Err(crate::directory::DirectoryError::NotFound) => {
                warn!(workshop = %workshop.0, "verification event for unknown workshop");
                self.support_alert("unknown_workshop", &workshop.0);
                Ok(WebhookOutcome::UnknownWorkshop)
            }
            Err(crate::directory::DirectoryError::Unavailable(message)) => {
                Err(ReconciliationError::Directory(message))
            }
        }
    }

    /// Bring the order in line with a confirmed payment, unless it already
    /// advanced past `AwaitingPayment`.
    fn confirm_order_payment(
        &self,
        record: &FinancialRecord,
    ) -> Result<(), ReconciliationError> {
        let order = self.scheduling.get(&record.order)?;
        match order.status {
            ScheduleStatus::AwaitingPayment => {
                self.scheduling.confirm_payment(&record.order)?;
            }
            ScheduleStatus::PaymentRejected => {
                // A failure event beat the confirmation; the gateway says
                // the money arrived after all.
                self.scheduling.reopen_payment(&record.order)?;
                self.scheduling.confirm_payment(&record.order)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn lookup(&self, invoice: &InvoiceId) -> Result<Option<FinancialRecord>, LedgerError> {
        self.ledger.fetch_by_invoice(invoice)
    }

    fn unknown_invoice(&self, invoice: &InvoiceId) -> WebhookOutcome {
        warn!(invoice = %invoice.0, "event references an unknown invoice, dropping");
        self.support_alert("unknown_invoice", &invoice.0);
        WebhookOutcome::UnknownInvoice
    }

    fn support_alert(&self, key: &str, value: &str) {
        let mut details = BTreeMap::new();
        details.insert(key.to_string(), value.to_string());
        self.notifications.enqueue(Notification {
            recipient: Recipient::Support,
            kind: NotificationKind::SupportAlert,
            order: None,
            details,
        });
    }
}
