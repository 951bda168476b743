use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::directory::{CustomerProfile, DirectoryError, WorkshopDirectory, WorkshopProfile};
use crate::notify::NotificationQueue;
use crate::scheduling::audit::StatusEvent;
use crate::scheduling::budget::{BudgetSubmission, ServiceItem};
use crate::scheduling::domain::{
    CustomerId, InvoiceId, OrderId, OrderRequest, ScheduleStatus, SchedulingOrder, ServiceItemId,
    VehicleId, WorkshopId,
};
use crate::scheduling::repository::{NoSettlement, RepositoryError, SchedulingRepository};
use crate::scheduling::service::SchedulingService;
use crate::settlement::coordinator::{SettlementCoordinator, SettlementOutcome};
use crate::settlement::fees::StaticFeeSchedule;
use crate::settlement::gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, InvoiceSnapshot, PaymentGateway, PaymentMethod,
    RefundReceipt,
};
use crate::settlement::ledger::{FinancialRecord, LedgerError, LedgerRepository};
use crate::settlement::webhook::ReconciliationHandler;

pub(super) const PROJECT: &str = "repairhub-test";

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

#[derive(Default)]
pub(super) struct MemoryLedger {
    records: Mutex<HashMap<OrderId, FinancialRecord>>,
}

impl MemoryLedger {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("ledger mutex poisoned").len()
    }
}

impl LedgerRepository for MemoryLedger {
    fn insert(&self, record: FinancialRecord) -> Result<FinancialRecord, LedgerError> {
        let mut guard = self.records.lock().expect("ledger mutex poisoned");
        if guard.contains_key(&record.order) {
            return Err(LedgerError::Conflict);
        }
        guard.insert(record.order.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: FinancialRecord) -> Result<(), LedgerError> {
        let mut guard = self.records.lock().expect("ledger mutex poisoned");
        if guard.contains_key(&record.order) {
            guard.insert(record.order.clone(), record);
            Ok(())
        } else {
            Err(LedgerError::NotFound)
        }
    }

    fn fetch_by_order(&self, order: &OrderId) -> Result<Option<FinancialRecord>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard.get(order).cloned())
    }

    fn fetch_by_invoice(
        &self,
        invoice: &InvoiceId,
    ) -> Result<Option<FinancialRecord>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard
            .values()
            .find(|record| &record.invoice == invoice)
            .cloned())
    }
}

/// Gateway double whose next responses the test scripts; every charge
/// request is recorded for idempotency assertions.
#[derive(Default)]
pub(super) struct ScriptedGateway {
    pub(super) charge_requests: Mutex<Vec<ChargeRequest>>,
    pub(super) refunds: Mutex<Vec<(InvoiceId, Decimal)>>,
    scripted: Mutex<VecDeque<Result<ChargeReceipt, GatewayError>>>,
}

impl ScriptedGateway {
    pub(super) fn script(&self, response: Result<ChargeReceipt, GatewayError>) {
        self.scripted
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(response);
    }

    pub(super) fn charge_count(&self) -> usize {
        self.charge_requests
            .lock()
            .expect("gateway mutex poisoned")
            .len()
    }

    pub(super) fn idempotency_keys(&self) -> Vec<String> {
        self.charge_requests
            .lock()
            .expect("gateway mutex poisoned")
            .iter()
            .map(|request| request.idempotency_key.clone())
            .collect()
    }
}

impl PaymentGateway for Arc<ScriptedGateway> {
    fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.charge_requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(request.clone());
        let scripted = self
            .scripted
            .lock()
            .expect("gateway mutex poisoned")
            .pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(ChargeReceipt {
                invoice: InvoiceId(format!("inv-{}", request.idempotency_key)),
                processing_fee: dec!(3.50),
            }),
        }
    }

    fn refund(&self, invoice: &InvoiceId, amount: Decimal) -> Result<RefundReceipt, GatewayError> {
        self.refunds
            .lock()
            .expect("gateway mutex poisoned")
            .push((invoice.clone(), amount));
        Ok(RefundReceipt {
            invoice: invoice.clone(),
            amount,
        })
    }

    fn lookup_invoice(&self, invoice: &InvoiceId) -> Result<InvoiceSnapshot, GatewayError> {
        Ok(InvoiceSnapshot {
            invoice: invoice.clone(),
            paid: false,
            paid_at: None,
        })
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    workshops: Mutex<HashMap<WorkshopId, WorkshopProfile>>,
}

impl MemoryDirectory {
    pub(super) fn with_workshop(id: &str) -> Arc<Self> {
        let directory = Self::default();
        directory.workshops.lock().expect("mutex poisoned").insert(
            WorkshopId(id.to_string()),
            WorkshopProfile {
                id: WorkshopId(id.to_string()),
                name: "Gearbox & Sons".to_string(),
                email: "shop@example.com".to_string(),
                bank_verified: false,
            },
        );
        Arc::new(directory)
    }

    pub(super) fn bank_verified(&self, id: &str) -> Option<bool> {
        self.workshops
            .lock()
            .expect("mutex poisoned")
            .get(&WorkshopId(id.to_string()))
            .map(|profile| profile.bank_verified)
    }
}

impl WorkshopDirectory for MemoryDirectory {
    fn customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, DirectoryError> {
        Ok(Some(CustomerProfile {
            id: id.clone(),
            name: "Test Customer".to_string(),
            email: "customer@example.com".to_string(),
        }))
    }

    fn workshop(&self, id: &WorkshopId) -> Result<Option<WorkshopProfile>, DirectoryError> {
        Ok(self
            .workshops
            .lock()
            .expect("mutex poisoned")
            .get(id)
            .cloned())
    }

    fn set_bank_verified(&self, id: &WorkshopId, verified: bool) -> Result<(), DirectoryError> {
        let mut guard = self.workshops.lock().expect("mutex poisoned");
        match guard.get_mut(id) {
            Some(profile) => {
                profile.bank_verified = verified;
                Ok(())
            }
            None => Err(DirectoryError::NotFound),
        }
    }
}

pub(super) struct SettlementContext {
    pub(super) scheduling: Arc<SchedulingService<MemoryRepository>>,
    pub(super) coordinator: SettlementCoordinator<MemoryLedger>,
    pub(super) handler: ReconciliationHandler<MemoryRepository, MemoryLedger>,
    pub(super) ledger: Arc<MemoryLedger>,
    pub(super) gateway: Arc<ScriptedGateway>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) notifications: Arc<NotificationQueue>,
}

pub(super) fn context() -> SettlementContext {
    let repository = Arc::new(MemoryRepository::default());
    let notifications = NotificationQueue::new();
    let scheduling = Arc::new(SchedulingService::new(
        repository,
        Arc::new(NoSettlement),
        notifications.clone(),
    ));
    let ledger = Arc::new(MemoryLedger::default());
    let gateway = Arc::new(ScriptedGateway::default());
    let coordinator = SettlementCoordinator::new(
        ledger.clone(),
        Box::new(gateway.clone()),
        Arc::new(StaticFeeSchedule::new(dec!(0.10))),
    );
    let directory = MemoryDirectory::with_workshop("wks-7");
    let handler = ReconciliationHandler::new(
        scheduling.clone(),
        ledger.clone(),
        directory.clone(),
        notifications.clone(),
        PROJECT,
    );
    SettlementContext {
        scheduling,
        coordinator,
        handler,
        ledger,
        gateway,
        directory,
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
        evidence_images: Vec::new(),
    }
}

/// Drive a fresh order to `AwaitingPayment` with a 350.00 total.
pub(super) fn awaiting_payment(ctx: &SettlementContext) -> OrderId {
    let order = ctx.scheduling.create(request()).expect("create succeeds");
    ctx.scheduling
        .confirm(&order.id, None)
        .expect("confirm succeeds");
    ctx.scheduling
        .submit_budget(&order.id, submission())
        .expect("budget submission succeeds");
    ctx.scheduling
        .resolve_budget(
            &order.id,
            &[
                ServiceItemId("svc-1".to_string()),
                ServiceItemId("svc-2".to_string()),
            ],
        )
        .expect("resolution succeeds");
    order.id
}

/// Drive an order to `AwaitingPayment` and open the charge.
pub(super) fn charged(ctx: &SettlementContext) -> (OrderId, InvoiceId) {
    let id = awaiting_payment(ctx);
    let outcome = ctx
        .coordinator
        .settle(&ctx.scheduling, &id, PaymentMethod::CreditCard, 1)
        .expect("settlement succeeds");
    match outcome {
        SettlementOutcome::Charged(record) => (id, record.invoice),
        other => panic!("expected a charge, got {other:?}"),
    }
}
