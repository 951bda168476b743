//! Payment settlement: charging approved budgets through the gateway seam,
//! the financial ledger, and webhook reconciliation of asynchronous gateway
//! events.

pub mod coordinator;
pub mod fees;
pub mod gateway;
pub mod ledger;
pub mod router;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use coordinator::{SettlementCoordinator, SettlementError, SettlementOutcome};
pub use fees::{FeeSchedule, StaticFeeSchedule};
pub use gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, InvoiceSnapshot, PaymentGateway, PaymentMethod,
    RefundReceipt,
};
pub use ledger::{FinancialRecord, LedgerError, LedgerRepository, PaymentStatus};
pub use router::webhook_router;
pub use webhook::{
    GatewayEvent, InvoiceTerminalStatus, ReconciliationError, ReconciliationHandler,
    WebhookEnvelope, WebhookOutcome,
};
