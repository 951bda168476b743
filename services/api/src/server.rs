use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryDirectory, InMemoryLedger, InMemorySchedulingRepository,
    LoggingNotificationSender, SandboxGateway,
};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use repairhub::config::AppConfig;
use repairhub::error::AppError;
use repairhub::notify::NotificationQueue;
use repairhub::scheduling::router::SchedulingApi;
use repairhub::scheduling::service::SchedulingService;
use repairhub::settlement::coordinator::SettlementCoordinator;
use repairhub::settlement::fees::StaticFeeSchedule;
use repairhub::settlement::webhook::ReconciliationHandler;
use repairhub::telemetry;
use tracing::info;

const NOTIFICATION_DRAIN_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemorySchedulingRepository::default());
    let ledger = Arc::new(InMemoryLedger::default());
    let notifications = NotificationQueue::new();
    let scheduling = Arc::new(SchedulingService::new(
        repository,
        ledger.clone(),
        notifications.clone(),
    ));
    let settlement = Arc::new(SettlementCoordinator::new(
        ledger.clone(),
        Box::new(SandboxGateway::default()),
        Arc::new(StaticFeeSchedule::new(config.gateway.platform_fee_rate)),
    ));
    let handler = Arc::new(ReconciliationHandler::new(
        scheduling.clone(),
        ledger,
        InMemoryDirectory::seeded(),
        notifications.clone(),
        config.gateway.project.clone(),
    ));

    // Outbound deliveries run off every request path; failed sends stay
    // queued for the next pass.
    let drain_queue = notifications.clone();
    tokio::spawn(async move {
        let sender = LoggingNotificationSender;
        let mut ticker = tokio::time::interval(NOTIFICATION_DRAIN_INTERVAL);
        loop {
            ticker.tick().await;
            drain_queue.drain(&sender);
        }
    });

    let app = with_platform_routes(
        SchedulingApi {
            scheduling,
            settlement,
        },
        handler,
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, project = %config.gateway.project, "repair scheduling service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
