use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryUserStore, InProcessEventBus, LogMailer};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use onboarding::config::AppConfig;
use onboarding::error::AppError;
use onboarding::telemetry;
use onboarding::workflows::notifications::{
    run_consumer, NotificationDispatcher, NotificationTemplates,
};
use onboarding::workflows::residency::{
    BcryptHasher, HttpApartmentDirectory, OutboxRelay, RegistrationPolicy, ResidentOnboardingService,
    ResilientDirectory, RoleRegistry,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

const EVENT_BUS_CAPACITY: usize = 1_024;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let roles = RoleRegistry::from_names(&config.roles.names);
    roles.require_well_known()?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryUserStore::default());
    let directory = Arc::new(ResilientDirectory::new(
        HttpApartmentDirectory::new(&config.directory)?,
        &config.directory,
    ));
    let hasher = Arc::new(BcryptHasher::new(config.registration.bcrypt_cost));

    let (bus, bus_receiver) = InProcessEventBus::channel(EVENT_BUS_CAPACITY);
    let relay = Arc::new(OutboxRelay::new(store.clone(), Arc::new(bus), &config.outbox));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(LogMailer),
        NotificationTemplates::from(&config.notifications),
    ));

    let onboarding_service = Arc::new(
        ResidentOnboardingService::new(
            store,
            directory,
            hasher,
            Arc::new(roles),
            RegistrationPolicy::from(&config.registration),
        )
        .with_outbox_signal(relay.signal()),
    );

    let relay_task = tokio::spawn({
        let relay = relay.clone();
        async move { relay.run().await }
    });
    let consumer_task = tokio::spawn(run_consumer(dispatcher, bus_receiver));

    let app = with_onboarding_routes(onboarding_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        directory = %config.directory.base_url,
        "resident onboarding service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    relay_task.abort();
    let _ = relay_task.await;
    // The bus sender lives in the relay; dropping it lets the consumer drain
    // and stop.
    drop(relay);
    if let Err(err) = consumer_task.await {
        warn!(error = %err, "notification consumer ended abnormally");
    }
    info!("resident onboarding service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
