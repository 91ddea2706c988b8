//! Test harness with testcontainers for integration testing.
//!
//! A single Postgres container is started on first use and reused across
//! all tests in the process; each test gets its own `PgPool` connected to
//! it. Migrations run once against the shared container.

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::store::postgres::{PgEndpointStore, PgJobStore, PgRunStore, PgSessionStore};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::OnceCell;

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<GenericImage>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16")
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test handle: a fresh pool plus the concrete store implementations
/// wired against it.
pub struct TestHarness {
    pub db_pool: PgPool,
    pub endpoint_store: Arc<PgEndpointStore>,
    pub job_store: Arc<PgJobStore>,
    pub run_store: Arc<PgRunStore>,
    pub session_store: Arc<PgSessionStore>,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("failed to connect to test database")?;

        Ok(Self {
            endpoint_store: Arc::new(PgEndpointStore::new(db_pool.clone())),
            job_store: Arc::new(PgJobStore::new(db_pool.clone())),
            run_store: Arc::new(PgRunStore::new(db_pool.clone())),
            session_store: Arc::new(PgSessionStore::new(db_pool.clone())),
            db_pool,
        })
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
