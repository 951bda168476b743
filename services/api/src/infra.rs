use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use repairhub::directory::{CustomerProfile, DirectoryError, WorkshopDirectory, WorkshopProfile};
use repairhub::notify::{Notification, NotificationSender, NotifyError};
use repairhub::scheduling::audit::StatusEvent;
use repairhub::scheduling::domain::{
    CustomerId, InvoiceId, OrderId, ScheduleStatus, SchedulingOrder, WorkshopId,
};
use repairhub::scheduling::repository::{
    RepositoryError, SchedulingRepository, SettlementProbe,
};
use repairhub::settlement::gateway::{
    ChargeReceipt, ChargeRequest, GatewayError, InvoiceSnapshot, PaymentGateway, RefundReceipt,
};
use repairhub::settlement::ledger::{
    settlement_active, FinancialRecord, LedgerError, LedgerRepository,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemorySchedulingRepository {
    orders: Mutex<HashMap<OrderId, SchedulingOrder>>,
    events: Mutex<Vec<StatusEvent>>,
}

impl SchedulingRepository for InMemorySchedulingRepository {
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
pub(crate) struct InMemoryLedger {
    records: Mutex<HashMap<OrderId, FinancialRecord>>,
}

impl LedgerRepository for InMemoryLedger {
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

impl SettlementProbe for InMemoryLedger {
    fn settlement_active(&self, order: &OrderId) -> bool {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        settlement_active(guard.get(order))
    }
}

#[derive(Default)]
pub(crate) struct InMemoryDirectory {
    workshops: Mutex<HashMap<WorkshopId, WorkshopProfile>>,
}

impl InMemoryDirectory {
    pub(crate) fn seeded() -> Arc<Self> {
        let directory = Self::default();
        {
            let mut guard = directory
                .workshops
                .lock()
                .expect("directory mutex poisoned");
            guard.insert(
                WorkshopId("wks-1".to_string()),
                WorkshopProfile {
                    id: WorkshopId("wks-1".to_string()),
                    name: "Main Street Auto".to_string(),
                    email: "contact@mainstreetauto.example".to_string(),
                    bank_verified: false,
                },
            );
        }
        Arc::new(directory)
    }
}

impl WorkshopDirectory for InMemoryDirectory {
    fn customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, DirectoryError> {
        Ok(Some(CustomerProfile {
            id: id.clone(),
            name: "Registered Customer".to_string(),
            email: "customer@example.com".to_string(),
        }))
    }

    fn workshop(&self, id: &WorkshopId) -> Result<Option<WorkshopProfile>, DirectoryError> {
        Ok(self
            .workshops
            .lock()
            .expect("directory mutex poisoned")
            .get(id)
            .cloned())
    }

    fn set_bank_verified(&self, id: &WorkshopId, verified: bool) -> Result<(), DirectoryError> {
        let mut guard = self.workshops.lock().expect("directory mutex poisoned");
        match guard.get_mut(id) {
            Some(profile) => {
                profile.bank_verified = verified;
                Ok(())
            }
            None => Err(DirectoryError::NotFound),
        }
    }
}

/// Deterministic in-process gateway for development and demo deployments.
/// Accepts every charge and mints sequential invoice identifiers; a real
/// deployment swaps in the production gateway client through the same
/// `PaymentGateway` seam via configuration.
#[derive(Default)]
pub(crate) struct SandboxGateway {
    sequence: AtomicU64,
    issued: Mutex<HashMap<String, InvoiceId>>,
}

impl PaymentGateway for SandboxGateway {
    fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let mut issued = self.issued.lock().expect("gateway mutex poisoned");
        // Same idempotency key, same invoice: retries never double-charge.
        let invoice = issued
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| {
                let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                InvoiceId(format!("sbx-{id:06}"))
            })
            .clone();
        Ok(ChargeReceipt {
            invoice,
            processing_fee: sandbox_processing_fee(request.amount),
        })
    }

    fn refund(&self, invoice: &InvoiceId, amount: Decimal) -> Result<RefundReceipt, GatewayError> {
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

fn sandbox_processing_fee(amount: Decimal) -> Decimal {
    repairhub::money::round_fiscal(amount * dec!(0.01))
}

/// Sender that writes deliveries to the log; a real deployment plugs the
/// mail/push transport in through the same seam.
pub(crate) struct LoggingNotificationSender;

impl NotificationSender for LoggingNotificationSender {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            template = notification.kind.template(),
            recipient = ?notification.recipient,
            order = notification
                .order
                .as_ref()
                .map(|order| order.0.as_str())
                .unwrap_or("-"),
            "notification dispatched"
        );
        Ok(())
    }
}
