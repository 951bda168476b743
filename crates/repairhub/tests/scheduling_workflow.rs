mod common;

use common::*;

use repairhub::scheduling::domain::ScheduleStatus;
use repairhub::settlement::gateway::PaymentMethod;
use repairhub::settlement::ledger::{LedgerRepository, PaymentStatus};
use repairhub::settlement::webhook::{
    GatewayEvent, InvoiceTerminalStatus, WebhookEnvelope, WebhookOutcome,
};

use rust_decimal_macros::dec;

#[test]
fn full_engagement_from_request_to_finished() {
    let h = harness();

    let order = h.scheduling.create(request()).expect("create succeeds");
    assert_eq!(order.status, ScheduleStatus::Requested);

    let order = h
        .scheduling
        .confirm(&order.id, None)
        .expect("confirm succeeds");
    assert_eq!(order.status, ScheduleStatus::AwaitingBudget);

    let order = h
        .scheduling
        .submit_budget(&order.id, submission())
        .expect("budget submission succeeds");
    assert_eq!(order.status, ScheduleStatus::BudgetSent);

    let order = h
        .scheduling
        .resolve_budget(&order.id, &item_ids(&["svc-1", "svc-2"]))
        .expect("resolution succeeds");
    assert_eq!(order.status, ScheduleStatus::AwaitingPayment);
    assert_eq!(order.total_value, Some(dec!(350.00)));

    h.coordinator
        .settle(&h.scheduling, &order.id, PaymentMethod::CreditCard, 1)
        .expect("settlement succeeds");
    let invoice = h
        .scheduling
        .get(&order.id)
        .expect("order loads")
        .invoice
        .expect("invoice recorded");

    let outcome = h
        .handler
        .handle(WebhookEnvelope {
            project: PROJECT.to_string(),
            event: GatewayEvent::InvoiceStatusChanged {
                invoice: invoice.0.clone(),
                status: InvoiceTerminalStatus::Paid,
            },
        })
        .expect("paid event applies");
    assert_eq!(outcome, WebhookOutcome::Applied);
    assert_eq!(
        h.scheduling.get(&order.id).expect("order loads").status,
        ScheduleStatus::PaymentConfirmed
    );

    h.scheduling
        .start_service(&order.id)
        .expect("start succeeds");
    h.scheduling
        .complete_service(&order.id)
        .expect("completion succeeds");
    assert_eq!(
        h.scheduling.get(&order.id).expect("order loads").status,
        ScheduleStatus::AwaitingCompletionApproval
    );

    let order = h
        .scheduling
        .approve_completion(&order.id)
        .expect("approval succeeds");
    assert_eq!(order.status, ScheduleStatus::Finished);

    let record = h
        .ledger
        .fetch_by_order(&order.id)
        .expect("ledger fetch succeeds")
        .expect("record present");
    assert_eq!(record.status, PaymentStatus::Paid);
    assert_eq!(record.gross_value, dec!(350.00));
}

#[test]
fn partial_approval_keeps_the_excluded_service_on_record() {
    let h = harness();

    let order = h.scheduling.create(request()).expect("create succeeds");
    h.scheduling
        .confirm(&order.id, None)
        .expect("confirm succeeds");

    // Two services: the customer keeps only the 150.00 one.
    let mut submission = submission();
    submission.items[0].price = dec!(150.00);
    h.scheduling
        .submit_budget(&order.id, submission)
        .expect("budget submission succeeds");

    let order = h
        .scheduling
        .resolve_budget(&order.id, &item_ids(&["svc-1"]))
        .expect("resolution succeeds");

    assert_eq!(order.status, ScheduleStatus::AwaitingPayment);
    assert_eq!(order.total_value, Some(dec!(200.00)));
    assert_eq!(order.approved_services, item_ids(&["svc-1"]));
    assert_eq!(order.excluded_services, item_ids(&["svc-2"]));

    let events = h.scheduling.events(&order.id).expect("events load");
    assert!(events
        .iter()
        .any(|event| event.status == ScheduleStatus::BudgetPartiallyApproved));
}

#[test]
fn refused_request_never_grows_a_budget_or_total() {
    let h = harness();

    let order = h.scheduling.create(request()).expect("create succeeds");
    let order = h
        .scheduling
        .refuse(&order.id, "workshop fully booked")
        .expect("refusal succeeds");

    assert_eq!(order.status, ScheduleStatus::Refused);
    assert!(order.budget.is_none());
    assert!(order.total_value.is_none());
    assert_eq!(h.ledger.len(), 0);
}
