use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use crate::notify::NotificationQueue;
use crate::scheduling::audit::StatusEvent;
use crate::scheduling::budget::{BudgetSubmission, ServiceItem};
use crate::scheduling::domain::{
    CustomerId, OrderId, OrderRequest, ScheduleStatus, SchedulingOrder, ServiceItemId, VehicleId,
    WorkshopId,
};
use crate::scheduling::repository::{
    RepositoryError, SchedulingRepository, SettlementProbe,
};
use crate::scheduling::service::SchedulingService;

#[derive(Default)]
pub(super) struct MemoryRepository {
    orders: Mutex<HashMap<OrderId, SchedulingOrder>>,
    events: Mutex<Vec<StatusEvent>>,
}

impl SchedulingRepository for MemoryRepository {
    fn insert(&self, order: SchedulingOrder) -> Result<SchedulingOrder, RepositoryError> {
        let mut guard = self.orders.lock().expect("repository mutex poisoned");
        if guard.contains_key(&order.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<SchedulingOrder>, RepositoryError> {
        let guard = self.orders.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_guarded(
        &self,
        order: SchedulingOrder,
        expected: ScheduleStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.orders.lock().expect("repository mutex poisoned");
        let current = guard.get(&order.id).ok_or(RepositoryError::NotFound)?;
        if current.status != expected {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(order.id.clone(), order);
        Ok(())
    }

    fn append_event(&self, event: StatusEvent) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("event mutex poisoned");
        guard.push(event);
        Ok(())
    }

    fn events(&self, id: &OrderId) -> Result<Vec<StatusEvent>, RepositoryError> {
        let guard = self.events.lock().expect("event mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| &event.order == id)
            .cloned()
            .collect())
    }
}

/// Probe stub whose answer the test controls.
pub(super) struct StubProbe {
    pub(super) active: Mutex<bool>,
}

impl StubProbe {
    pub(super) fn inactive() -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(false),
        })
    }

    pub(super) fn set_active(&self, active: bool) {
        *self.active.lock().expect("probe mutex poisoned") = active;
    }
}

impl SettlementProbe for StubProbe {
    fn settlement_active(&self, _order: &OrderId) -> bool {
        *self.active.lock().expect("probe mutex poisoned")
    }
}

pub(super) struct TestContext {
    pub(super) service: Arc<SchedulingService<MemoryRepository>>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) probe: Arc<StubProbe>,
    pub(super) notifications: Arc<NotificationQueue>,
}

pub(super) fn context() -> TestContext {
    let repository = Arc::new(MemoryRepository::default());
    let probe = StubProbe::inactive();
    let notifications = NotificationQueue::new();
    let service = Arc::new(SchedulingService::new(
        repository.clone(),
        probe.clone(),
        notifications.clone(),
    ));
    TestContext {
        service,
        repository,
        probe,
        notifications,
    }
}

pub(super) fn request() -> OrderRequest {
    OrderRequest {
        customer: CustomerId("cus-100".to_string()),
        workshop: WorkshopId("wks-7".to_string()),
        vehicle: VehicleId("veh-42".to_string()),
        requested_date: NaiveDate::from_ymd_opt(2025, 11, 3).expect("valid date"),
        requested_services: vec!["brakes grinding".to_string()],
    }
}

pub(super) fn submission() -> BudgetSubmission {
    BudgetSubmission {
        diagnostic_fee: dec!(50.00),
        items: vec![
            ServiceItem {
                id: ServiceItemId("svc-1".to_string()),
                description: "replace brake pads".to_string(),
                price: dec!(100.00),
            },
            ServiceItem {
                id: ServiceItemId("svc-2".to_string()),
                description: "replace brake discs".to_string(),
                price: dec!(200.00),
            },
        ],
        estimated_hours: 4.0,
        evidence_images: vec!["img/diagnosis.jpg".to_string()],
    }
}

pub(super) fn item_ids(ids: &[&str]) -> Vec<ServiceItemId> {
    ids.iter().map(|id| ServiceItemId(id.to_string())).collect()
}

/// Drive a fresh order to `BudgetSent`.
pub(super) fn budget_sent(ctx: &TestContext) -> OrderId {
    let order = ctx.service.create(request()).expect("create succeeds");
    ctx.service.confirm(&order.id, None).expect("confirm succeeds");
    ctx.service
        .submit_budget(&order.id, submission())
        .expect("budget submission succeeds");
    order.id
}

/// Drive a fresh order to `AwaitingCompletionApproval` with every budget
/// item approved.
pub(super) fn awaiting_completion(ctx: &TestContext) -> OrderId {
    let id = budget_sent(ctx);
    ctx.service
        .resolve_budget(&id, &item_ids(&["svc-1", "svc-2"]))
        .expect("resolution succeeds");
    ctx.service
        .confirm_payment(&id)
        .expect("payment confirmation succeeds");
    ctx.service.start_service(&id).expect("start succeeds");
    ctx.service
        .complete_service(&id)
        .expect("completion succeeds");
    id
}
