//! Payment settlement coordination.
//!
//! Opens charges for orders that reached `AwaitingPayment`, keeps the
//! financial ledger 1:1 with the order, and executes refunds decided by the
//! admin override path. The gateway call always happens before the order
//! transition is applied, and the scheduling-order id doubles as the
//! idempotency key so a retry after a timeout can never charge twice.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::scheduling::domain::{OrderId, ScheduleStatus};
use crate::scheduling::repository::SchedulingRepository;
use crate::scheduling::service::{SchedulingService, SchedulingServiceError};

use super::fees::FeeSchedule;
use super::gateway::{ChargeRequest, GatewayError, PaymentGateway, PaymentMethod};
use super::ledger::{FinancialRecord, LedgerError, LedgerRepository, PaymentStatus};

/// How a settlement attempt ended. A declined charge is an outcome, not an
/// error: the order moves to `PaymentRejected` and the customer may retry.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Charge accepted by the gateway; the order stays in `AwaitingPayment`
    /// until a gateway event confirms the money.
    Charged(FinancialRecord),
    /// A live charge already existed for this order; nothing new was opened.
    AlreadyCharged(FinancialRecord),
    /// The gateway declined; the order is now `PaymentRejected`.
    Declined { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("order has no computed total to settle")]
    MissingTotal,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingServiceError),
    #[error("no settlement record exists for this order")]
    NoRecord,
}

pub struct SettlementCoordinator<L> {
    ledger: Arc<L>,
    gateway: Box<dyn PaymentGateway>,
    fees: Arc<dyn FeeSchedule>,
}

impl<L> SettlementCoordinator<L>
where
    L: LedgerRepository + 'static,
{
    pub fn new(ledger: Arc<L>, gateway: Box<dyn PaymentGateway>, fees: Arc<dyn FeeSchedule>) -> Self {
        Self {
            ledger,
            gateway,
            fees,
        }
    }

    /// Open (or retry) the charge for an order awaiting payment.
    ///
    /// A timeout bubbles up as `GatewayError::Timeout`; calling again reuses
    /// the same idempotency key and, for a previously rejected settlement,
    /// the same ledger record.
    pub fn settle<R>(
        &self,
        scheduling: &SchedulingService<R>,
        id: &OrderId,
        method: PaymentMethod,
        installments: u32,
    ) -> Result<SettlementOutcome, SettlementError>
    where
        R: SchedulingRepository + 'static,
    {
        let order = scheduling.get(id)?;
        if order.status != ScheduleStatus::AwaitingPayment {
            return Err(SchedulingServiceError::from(
                crate::scheduling::service::ConflictError::StatusMismatch {
                    order: order.id.clone(),
                    expected: ScheduleStatus::AwaitingPayment,
                    actual: order.status,
                },
            )
            .into());
        }
        let total = order.total_value.ok_or(SettlementError::MissingTotal)?;

        let existing = self.ledger.fetch_by_order(&order.id)?;
        if let Some(record) = &existing {
            if matches!(record.status, PaymentStatus::Pending | PaymentStatus::Paid) {
                // Retry after a timeout that actually went through, or a
                // double submit. The open charge stands.
                return Ok(SettlementOutcome::AlreadyCharged(record.clone()));
            }
        }

        let request = ChargeRequest {
            order: order.id.clone(),
            customer: order.customer.clone(),
            idempotency_key: order.id.0.clone(),
            amount: total,
            method,
            installments,
        };

        // External call first; the order transition is applied afterwards as
        // its own guarded update.
        let receipt = match self.gateway.create_charge(&request) {
            Ok(receipt) => receipt,
            Err(GatewayError::Declined { message }) => {
                warn!(order = %order.id.0, %message, "charge declined");
                if let Some(mut record) = existing {
                    record.status = PaymentStatus::Rejected;
                    self.ledger.update(record)?;
                }
                scheduling.reject_payment(&order.id, &message)?;
                return Ok(SettlementOutcome::Declined { message });
            }
            Err(other) => return Err(other.into()),
        };

        let record = match existing {
            Some(mut record) => {
                record.reopen(&receipt);
                self.ledger.update(record.clone())?;
                record
            }
            None => {
                let record = FinancialRecord::open(
                    order.id.clone(),
                    method,
                    installments,
                    total,
                    self.fees.platform_rate(),
                    &receipt,
                );
                self.ledger.insert(record)?
            }
        };

        scheduling.record_charge(&order.id, record.invoice.clone())?;
        info!(
            order = %order.id.0,
            invoice = %record.invoice.0,
            gross = %record.gross_value,
            "charge opened"
        );
        Ok(SettlementOutcome::Charged(record))
    }

    /// Execute a refund decided upstream (admin override) and record it on
    /// the existing ledger row.
    pub fn refund(&self, id: &OrderId, amount: Decimal) -> Result<FinancialRecord, SettlementError> {
        let mut record = self
            .ledger
            .fetch_by_order(id)?
            .ok_or(SettlementError::NoRecord)?;
        let receipt = self.gateway.refund(&record.invoice, amount)?;
        record.record_refund(receipt.amount, Utc::now());
        self.ledger.update(record.clone())?;
        info!(
            order = %id.0,
            invoice = %record.invoice.0,
            amount = %receipt.amount,
            "refund recorded"
        );
        Ok(record)
    }

    /// Gateway-side view of the invoice backing an order's settlement.
    pub fn lookup(&self, id: &OrderId) -> Result<super::gateway::InvoiceSnapshot, SettlementError> {
        let record = self
            .ledger
            .fetch_by_order(id)?
            .ok_or(SettlementError::NoRecord)?;
        Ok(self.gateway.lookup_invoice(&record.invoice)?)
    }
}
