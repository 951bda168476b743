use crate::infra::{
    InMemoryDirectory, InMemoryLedger, InMemorySchedulingRepository, LoggingNotificationSender,
    SandboxGateway,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use rust_decimal_macros::dec;
use std::sync::Arc;

use repairhub::error::AppError;
use repairhub::notify::NotificationQueue;
use repairhub::scheduling::budget::{BudgetSubmission, ServiceItem};
use repairhub::scheduling::domain::{
    CustomerId, OrderRequest, ServiceItemId, VehicleId, WorkshopId,
};
use repairhub::scheduling::service::SchedulingService;
use repairhub::settlement::coordinator::SettlementCoordinator;
use repairhub::settlement::fees::StaticFeeSchedule;
use repairhub::settlement::gateway::PaymentMethod;
use repairhub::settlement::ledger::LedgerRepository;
use repairhub::settlement::webhook::{
    GatewayEvent, InvoiceTerminalStatus, ReconciliationHandler, WebhookEnvelope,
};

const DEMO_PROJECT: &str = "repairhub-demo";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Requested service date (YYYY-MM-DD). Defaults to a week from today.
    #[arg(long)]
    pub(crate) requested_date: Option<NaiveDate>,
    /// Approve only the first budget item instead of the full budget.
    #[arg(long)]
    pub(crate) partial: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let repository = Arc::new(InMemorySchedulingRepository::default());
    let ledger = Arc::new(InMemoryLedger::default());
    let notifications = NotificationQueue::new();
    let scheduling = Arc::new(SchedulingService::new(
        repository,
        ledger.clone(),
        notifications.clone(),
    ));
    let coordinator = SettlementCoordinator::new(
        ledger.clone(),
        Box::new(SandboxGateway::default()),
        Arc::new(StaticFeeSchedule::new(dec!(0.10))),
    );
    let handler = ReconciliationHandler::new(
        scheduling.clone(),
        ledger.clone(),
        InMemoryDirectory::seeded(),
        notifications.clone(),
        DEMO_PROJECT,
    );

    let requested_date = args
        .requested_date
        .unwrap_or_else(|| Local::now().date_naive() + Duration::days(7));

    let order = scheduling.create(OrderRequest {
        customer: CustomerId("cus-demo".to_string()),
        workshop: WorkshopId("wks-1".to_string()),
        vehicle: VehicleId("veh-demo".to_string()),
        requested_date,
        requested_services: vec!["brakes grinding when stopping".to_string()],
    })?;
    scheduling.confirm(&order.id, None)?;
    scheduling.submit_budget(
        &order.id,
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
        },
    )?;

    let approved = if args.partial {
        vec![ServiceItemId("svc-1".to_string())]
    } else {
        vec![
            ServiceItemId("svc-1".to_string()),
            ServiceItemId("svc-2".to_string()),
        ]
    };
    let resolved = scheduling.resolve_budget(&order.id, &approved)?;
    println!(
        "budget resolved: status={} total={}",
        resolved.status.label(),
        resolved
            .total_value
            .map(|total| total.to_string())
            .unwrap_or_else(|| "-".to_string()),
    );

    coordinator.settle(&scheduling, &order.id, PaymentMethod::CreditCard, 1)?;
    let invoice = scheduling
        .get(&order.id)?
        .invoice
        .expect("demo settlement records an invoice");
    handler
        .handle(WebhookEnvelope {
            project: DEMO_PROJECT.to_string(),
            event: GatewayEvent::InvoiceStatusChanged {
                invoice: invoice.0.clone(),
                status: InvoiceTerminalStatus::Paid,
            },
        })
        .expect("demo paid event applies");

    scheduling.start_service(&order.id)?;
    scheduling.complete_service(&order.id)?;
    let finished = scheduling.approve_completion(&order.id)?;

    println!("engagement {} reached {}", finished.id.0, finished.status.label());
    println!("audit trail:");
    for event in scheduling.events(&order.id)? {
        println!(
            "  [{}] {:<28} {:<11} {}",
            event.recorded_at.format("%H:%M:%S"),
            event.status.label(),
            event.actor.label(),
            event.description,
        );
    }

    if let Some(record) = ledger.fetch_by_order(&order.id).ok().flatten() {
        println!(
            "ledger: invoice={} gross={} platform={} workshop_net={} status={}",
            record.invoice.0,
            record.gross_value,
            record.platform_value,
            record.workshop_net_value,
            record.status.label(),
        );
    }

    notifications.drain(&LoggingNotificationSender);
    Ok(())
}
