//! Process entrypoint: loads configuration, connects to Postgres, runs
//! schema migrations, spawns the scheduler worker (C8) and planner worker
//! (C10) as background tasks, and serves the management API (C14) until
//! a shutdown signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use server_core::dispatcher::HttpDispatcher;
use server_core::kernel::ai::OpenAiPlannerClient;
use server_core::kernel::traits::SystemClock;
use server_core::planner::{PlannerConfig, PlannerWorker};
use server_core::scheduler::{SchedulerConfig, SchedulerWorker};
use server_core::server::app::{build_app, AppState};
use server_core::store::postgres::{PgEndpointStore, PgJobStore, PgRunStore, PgSessionStore};
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting adaptive HTTP job scheduler");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("configuration loaded");

    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations complete");

    let endpoint_store = Arc::new(PgEndpointStore::new(pool.clone()));
    let job_store = Arc::new(PgJobStore::new(pool.clone()));
    let run_store = Arc::new(PgRunStore::new(pool.clone()));
    let session_store = Arc::new(PgSessionStore::new(pool.clone()));

    let dispatcher = Arc::new(HttpDispatcher::new().context("failed to build HTTP dispatcher")?);
    let clock = Arc::new(SystemClock);
    let llm_client = Arc::new(OpenAiPlannerClient::new(config.openai_api_key.clone()));

    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(SchedulerWorker::new(
        endpoint_store.clone(),
        run_store.clone(),
        dispatcher,
        clock.clone(),
        SchedulerConfig {
            batch_size: 10,
            lease_ms: config.lease_ms,
            idle_ms: config.idle_ms,
            zombie_age_ms: config.zombie_age_ms,
            shutdown_timeout_ms: config.shutdown_timeout_ms,
        },
    ));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let planner = Arc::new(PlannerWorker::new(
        endpoint_store.clone(),
        run_store.clone(),
        session_store.clone(),
        llm_client,
        clock,
        PlannerConfig::default(),
    ));
    let planner_handle = tokio::spawn(planner.run(shutdown.clone()));

    let state = AppState {
        db_pool: pool,
        job_store,
        endpoint_store,
        run_store,
        session_store,
    };
    let app = build_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting management API");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("server error")?;

    tracing::info!("management API stopped, waiting for workers to drain");
    shutdown.cancel();
    let _ = tokio::join!(scheduler_handle, planner_handle);
    tracing::info!("shutdown complete");

    Ok(())
}

/// Resolves once either Ctrl-C or SIGTERM arrives, so `docker stop` and an
/// interactive terminal both trigger the same graceful drain (§5
/// "Cancellation & timeout").
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
