//! Scheduling lifecycle: the multi-actor state machine every other
//! component reads from and writes into, plus budget negotiation, the
//! append-only audit trail, and the dispute/admin override path.

pub mod admin;
pub mod audit;
pub mod budget;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use admin::{AdminDecision, AdminOutcome};
pub use audit::StatusEvent;
pub use budget::{Budget, BudgetOutcome, BudgetSubmission, ServiceItem};
pub use domain::{
    Actor, CustomerId, Disapproval, Dispute, DisputeKind, InvoiceId, OrderId, OrderRequest,
    OrderStatusView, ScheduleStatus, SchedulingOrder, ServiceItemId, StatusGroup, VehicleId,
    WorkshopId,
};
pub use repository::{
    NoSettlement, RepositoryError, SchedulingRepository, SettlementProbe,
};
pub use router::{scheduling_router, SchedulingApi};
pub use service::{ConflictError, SchedulingService, SchedulingServiceError, ValidationError};
