//! Capability interface over the external payment gateway.
//!
//! Exactly one implementation is wired in per deployment, selected by static
//! configuration. Nothing in the system discovers gateway backends at
//! runtime.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::scheduling::domain::{CustomerId, InvoiceId, OrderId};

/// How the customer pays an approved budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
}

impl PaymentMethod {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

/// Charge creation request. The idempotency key is the scheduling-order
/// identifier, so a retry after a timeout can never open a second charge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub order: OrderId,
    pub customer: CustomerId,
    pub idempotency_key: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub installments: u32,
}

/// Gateway acknowledgment of an accepted charge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeReceipt {
    pub invoice: InvoiceId,
    /// Gateway processing fee for this charge, already in currency units.
    pub processing_fee: Decimal,
}

/// Gateway acknowledgment of a refund.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundReceipt {
    pub invoice: InvoiceId,
    pub amount: Decimal,
}

/// Current gateway-side view of an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSnapshot {
    pub invoice: InvoiceId,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Error surfaced by gateway calls. A `Timeout` is retried by the caller
/// with the same idempotency key; a `Declined` becomes `PaymentRejected`
/// carrying the gateway's message.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("charge declined by the gateway: {message}")]
    Declined { message: String },
    #[error("gateway call timed out")]
    Timeout,
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

/// The only seam the rest of the system knows the gateway through.
pub trait PaymentGateway: Send + Sync {
    fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;
    fn refund(&self, invoice: &InvoiceId, amount: Decimal) -> Result<RefundReceipt, GatewayError>;
    fn lookup_invoice(&self, invoice: &InvoiceId) -> Result<InvoiceSnapshot, GatewayError>;
}
