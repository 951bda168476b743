use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use repairhub::directory::{CustomerProfile, DirectoryError, WorkshopDirectory, WorkshopProfile};
use repairhub::notify::NotificationQueue;
use repairhub::scheduling::audit::StatusEvent;
use repairhub::scheduling::budget::{BudgetSubmission, ServiceItem};
use repairhub::scheduling::domain::{
    CustomerId, InvoiceId, OrderId, OrderRequest, ScheduleStatus, SchedulingOrder, ServiceItemId,
    VehicleId, WorkshopId,
};
use repairhub::scheduling::repository::{
    RepositoryError, SchedulingRepository, SettlementProbe,
};
use repairhub::scheduling::service::SchedulingService;
use repairhub::settlement::coordinator::SettlementCoordinator;
use repairhub::settlement::fees::StaticFeeSchedule;
use repairhub::settlement::gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, InvoiceSnapshot, PaymentGateway, RefundReceipt,
};
use repairhub::settlement::ledger::{
    settlement_active, FinancialRecord, LedgerError, LedgerRepository,
};
use repairhub::settlement::webhook::ReconciliationHandler;

pub const PROJECT: &str = "repairhub-it";

#[derive(Default)]
pub struct MemoryRepository {
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
pub struct MemoryLedger {
    records: Mutex<HashMap<OrderId, FinancialRecord>>,
}

impl MemoryLedger {
    pub fn len(&self) -> usize {
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

impl SettlementProbe for MemoryLedger {
    fn settlement_active(&self, order: &OrderId) -> bool {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        settlement_active(guard.get(order))
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    pub charge_requests: Mutex<Vec<ChargeRequest>>,
    pub refunds: Mutex<Vec<(InvoiceId, Decimal)>>,
    scripted: Mutex<VecDeque<Result<ChargeReceipt, GatewayError>>>,
}

impl ScriptedGateway {
    pub fn script(&self, response: Result<ChargeReceipt, GatewayError>) {
        self.scripted
            .lock()
            .expect("gateway mutex poisoned")
            .push_back(response);
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        self.charge_requests
            .lock()
            .expect("gateway mutex poisoned")
            .iter()
            .map(|request| request.idempotency_key.clone())
            .collect()
    }
}

/// Shareable `PaymentGateway` handle. The coordinator takes ownership of a
/// `Box<dyn PaymentGateway>`, while the test retains an `Arc<ScriptedGateway>`
/// to inspect recorded charges; this wrapper bridges the two without tripping
/// the orphan rule (which forbids `impl PaymentGateway for Arc<ScriptedGateway>`
/// outside the crate that defines the trait).
pub struct SharedGateway(pub Arc<ScriptedGateway>);

impl PaymentGateway for SharedGateway {
    fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        self.0.create_charge(request)
    }

    fn refund(&self, invoice: &InvoiceId, amount: Decimal) -> Result<RefundReceipt, GatewayError> {
        self.0.refund(invoice, amount)
    }

    fn lookup_invoice(&self, invoice: &InvoiceId) -> Result<InvoiceSnapshot, GatewayError> {
        self.0.lookup_invoice(invoice)
    }
}

impl PaymentGateway for ScriptedGateway {
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
pub struct MemoryDirectory {
    workshops: Mutex<HashMap<WorkshopId, WorkshopProfile>>,
}

impl MemoryDirectory {
    pub fn with_workshop(id: &str) -> Arc<Self> {
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

/// Everything wired together the way the api service does it, minus HTTP.
pub struct Harness {
    pub scheduling: Arc<SchedulingService<MemoryRepository>>,
    pub coordinator: Arc<SettlementCoordinator<MemoryLedger>>,
    pub handler: Arc<ReconciliationHandler<MemoryRepository, MemoryLedger>>,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<ScriptedGateway>,
    pub notifications: Arc<NotificationQueue>,
}

pub fn harness() -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let ledger = Arc::new(MemoryLedger::default());
    let notifications = NotificationQueue::new();
    let scheduling = Arc::new(SchedulingService::new(
        repository,
        ledger.clone(),
        notifications.clone(),
    ));
    let gateway = Arc::new(ScriptedGateway::default());
    let coordinator = Arc::new(SettlementCoordinator::new(
        ledger.clone(),
        Box::new(SharedGateway(gateway.clone())),
        Arc::new(StaticFeeSchedule::new(dec!(0.10))),
    ));
    let handler = Arc::new(ReconciliationHandler::new(
        scheduling.clone(),
        ledger.clone(),
        MemoryDirectory::with_workshop("wks-7"),
        notifications.clone(),
        PROJECT,
    ));
    Harness {
        scheduling,
        coordinator,
        handler,
        ledger,
        gateway,
        notifications,
    }
}

pub fn request() -> OrderRequest {
    OrderRequest {
        customer: CustomerId("cus-100".to_string()),
        workshop: WorkshopId("wks-7".to_string()),
        vehicle: VehicleId("veh-42".to_string()),
        requested_date: NaiveDate::from_ymd_opt(2025, 11, 3).expect("valid date"),
        requested_services: vec!["brakes grinding".to_string()],
    }
}

pub fn submission() -> BudgetSubmission {
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

pub fn item_ids(ids: &[&str]) -> Vec<ServiceItemId> {
    ids.iter().map(|id| ServiceItemId(id.to_string())).collect()
}
