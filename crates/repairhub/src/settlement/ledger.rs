//! Financial ledger: one settlement record per scheduling order, the single
//! source of truth for money movement.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_fiscal;
use crate::scheduling::domain::{InvoiceId, OrderId};

use super::gateway::{ChargeReceipt, PaymentMethod};

/// Payment-side status of a settlement record. `Pending` and `Paid` are the
/// non-terminal states: money is still in flight (awaiting confirmation or
/// awaiting payout release), which blocks order deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Released,
    Rejected,
    Expired,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Released => "released",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending | PaymentStatus::Paid)
    }
}

/// Money-movement bookkeeping row for one scheduling order (1:1).
///
/// Refunds mutate this record's reversal fields in place rather than
/// appending reversal entries, so multiple partial refunds collapse into
/// one accumulated figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub id: String,
    pub invoice: InvoiceId,
    pub order: OrderId,
    pub method: PaymentMethod,
    pub installments: u32,
    /// Amount charged to the customer.
    pub gross_value: Decimal,
    /// Gross minus the gateway processing fee.
    pub net_value: Decimal,
    pub processing_fee: Decimal,
    /// Platform fee rate at settlement time; later rate changes do not
    /// retroactively alter this record.
    pub platform_rate: Decimal,
    pub platform_value: Decimal,
    pub workshop_net_value: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub reversed_value: Option<Decimal>,
    pub status: PaymentStatus,
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl FinancialRecord {
    /// Build the record for a freshly accepted charge.
    pub fn open(
        order: OrderId,
        method: PaymentMethod,
        installments: u32,
        gross_value: Decimal,
        platform_rate: Decimal,
        receipt: &ChargeReceipt,
    ) -> Self {
        let platform_value = round_fiscal(gross_value * platform_rate);
        let net_value = round_fiscal(gross_value - receipt.processing_fee);
        let workshop_net_value =
            round_fiscal(gross_value - platform_value - receipt.processing_fee);
        let sequence = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("fin-{sequence:06}"),
            invoice: receipt.invoice.clone(),
            order,
            method,
            installments,
            gross_value,
            net_value,
            processing_fee: receipt.processing_fee,
            platform_rate,
            platform_value,
            workshop_net_value,
            paid_at: None,
            released_at: None,
            refunded_at: None,
            expired_at: None,
            reversed_value: None,
            status: PaymentStatus::Pending,
        }
    }

    /// Reset an earlier rejected settlement for a retry with the same
    /// idempotency key. The record identity is kept; only the charge data
    /// is replaced.
    pub fn reopen(&mut self, receipt: &ChargeReceipt) {
        self.invoice = receipt.invoice.clone();
        self.processing_fee = receipt.processing_fee;
        self.net_value = round_fiscal(self.gross_value - receipt.processing_fee);
        self.workshop_net_value =
            round_fiscal(self.gross_value - self.platform_value - receipt.processing_fee);
        self.paid_at = None;
        self.status = PaymentStatus::Pending;
    }

    /// Record a (partial or full) reversal against this record.
    pub fn record_refund(&mut self, amount: Decimal, at: DateTime<Utc>) {
        let accumulated = self.reversed_value.unwrap_or(Decimal::ZERO) + amount;
        self.reversed_value = Some(round_fiscal(accumulated));
        self.refunded_at = Some(at);
        if self.reversed_value == Some(self.gross_value) {
            self.status = PaymentStatus::Refunded;
        }
    }
}

/// Storage abstraction for settlement records.
pub trait LedgerRepository: Send + Sync {
    fn insert(&self, record: FinancialRecord) -> Result<FinancialRecord, LedgerError>;
    fn update(&self, record: FinancialRecord) -> Result<(), LedgerError>;
    fn fetch_by_order(&self, order: &OrderId) -> Result<Option<FinancialRecord>, LedgerError>;
    fn fetch_by_invoice(&self, invoice: &InvoiceId)
        -> Result<Option<FinancialRecord>, LedgerError>;
}

/// Error enumeration for ledger failures.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("settlement record already exists")]
    Conflict,
    #[error("settlement record not found")]
    NotFound,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Whether a record still blocks order deletion.
pub fn settlement_active(record: Option<&FinancialRecord>) -> bool {
    record.is_some_and(|record| !record.status.is_terminal())
}
