use super::audit::StatusEvent;
use super::domain::{OrderId, ScheduleStatus, SchedulingOrder};

/// Storage abstraction for scheduling orders and their audit trail.
///
/// `update_guarded` is the optimistic-concurrency seam: the persisted status
/// must still equal `expected` at apply time, otherwise the write is refused
/// with `Conflict` and nothing changes. Mutations for one order are applied
/// one at a time; implementations must make the compare-and-swap atomic.
pub trait SchedulingRepository: Send + Sync {
    fn insert(&self, order: SchedulingOrder) -> Result<SchedulingOrder, RepositoryError>;
    fn fetch(&self, id: &OrderId) -> Result<Option<SchedulingOrder>, RepositoryError>;
    fn update_guarded(
        &self,
        order: SchedulingOrder,
        expected: ScheduleStatus,
    ) -> Result<(), RepositoryError>;
    fn append_event(&self, event: StatusEvent) -> Result<(), RepositoryError>;
    fn events(&self, id: &OrderId) -> Result<Vec<StatusEvent>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Narrow view into the settlement ledger so the lifecycle can refuse to
/// disable an order while money is still moving, without depending on the
/// full ledger surface.
pub trait SettlementProbe: Send + Sync {
    fn settlement_active(&self, order: &OrderId) -> bool;
}

/// Probe for deployments with no settlement wired in (demos, some tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSettlement;

impl SettlementProbe for NoSettlement {
    fn settlement_active(&self, _order: &OrderId) -> bool {
        false
    }
}
