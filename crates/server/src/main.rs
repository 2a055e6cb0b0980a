//! CampusDesk server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{Router, routing::get};
use campusdesk_api::{AppState, RealtimeHub};
use campusdesk_common::Config;
use campusdesk_core::{
    AuditTrailRecorder, EmailTransportService, EventBus, NoOpEmailTransport, NotificationFanout,
    SmtpEmailTransport, TokenVerifier, WorkflowOrchestrator, WorkflowSubscriber,
};
use campusdesk_db::repositories::{
    AuditLogRepository, ComplaintRepository, NotificationRepository, UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Largest accepted request body. Attachments are uploaded elsewhere.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// How long shutdown waits for in-flight audit and notification work.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campusdesk=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn email_transport(config: &Config) -> anyhow::Result<EmailTransportService> {
    match config.email.as_ref().filter(|e| e.enabled) {
        Some(email) => {
            info!(relay = %email.smtp_host, "Email delivery enabled");
            Ok(Arc::new(SmtpEmailTransport::new(email)?))
        }
        None => {
            info!("Email delivery disabled");
            Ok(Arc::new(NoOpEmailTransport))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.logging.json);

    info!("Starting campusdesk server...");

    let db = campusdesk_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    campusdesk_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let complaint_repo = Arc::new(ComplaintRepository::new(Arc::clone(&db)));
    let user_repo = Arc::new(UserRepository::new(Arc::clone(&db)));
    let audit_repo = Arc::new(AuditLogRepository::new(Arc::clone(&db)));
    let notification_repo = Arc::new(NotificationRepository::new(Arc::clone(&db)));

    // Side-effect channels
    let realtime = RealtimeHub::new();
    let email = email_transport(&config)?;

    // Initialize services
    let recorder = AuditTrailRecorder::new(audit_repo, user_repo.clone());
    let fanout = NotificationFanout::new(
        notification_repo,
        user_repo.clone(),
        Arc::new(realtime.clone()),
        email,
        config.instance.name.clone(),
    );
    let subscribers: Vec<Arc<dyn WorkflowSubscriber>> =
        vec![Arc::new(recorder.clone()), Arc::new(fanout.clone())];
    let bus = EventBus::new(subscribers);
    let orchestrator = WorkflowOrchestrator::new(complaint_repo, user_repo.clone(), bus.clone());

    let state = AppState {
        orchestrator,
        audit: recorder,
        notifications: fanout,
        users: user_repo,
        tokens: TokenVerifier::from_config(&config.auth),
        realtime,
    };

    // Build router
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(campusdesk_api::app(state))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server.host {:?}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!(in_flight = bus.in_flight(), "Draining workflow side effects...");
    if tokio::time::timeout(DRAIN_TIMEOUT, bus.idle()).await.is_err() {
        warn!(in_flight = bus.in_flight(), "Shutdown drain timed out");
    }

    info!("Server shutdown complete");
    Ok(())
}
