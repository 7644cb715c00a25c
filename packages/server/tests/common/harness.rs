//! Test harness with testcontainers for integration testing.
//!
//! Uses shared containers across all tests for dramatically improved
//! performance. Containers and migrations are initialized once on first
//! test, then reused. Each test isolates itself with a unique redis channel.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use uuid::Uuid;

use server_core::config::{DueConfig, IntakeConfig};
use server_core::queue::{
    ApiKey, Application, Intake, NewTask, Notifier, Task, TaskMethod, TaskStore,
};

// =============================================================================
// Shared Test Infrastructure
// =============================================================================

/// Shared test infrastructure that persists across all tests.
/// Containers are started once and reused, migrations run once.
struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    // Keep containers alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Respect RUST_LOG when running tests with --nocapture.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{pg_host}:{pg_port}/postgres");

        let redis = Redis::default()
            .start()
            .await
            .context("Failed to start Redis container")?;

        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

// =============================================================================
// Test Harness
// =============================================================================

/// Per-test handle onto the shared database and redis.
pub struct TestHarness {
    pub pool: PgPool,
    pub store: TaskStore,
    pub notifier: Notifier,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;
        let store = TaskStore::new(pool.clone(), DueConfig::default());
        let notifier = Notifier::connect(&infra.redis_url)
            .await
            .context("Failed to connect to test redis")?;

        Ok(Self {
            pool,
            store,
            notifier,
        })
    }

    /// A channel name no other test writes to.
    pub fn unique_channel() -> String {
        format!("ntorque-test-{}", Uuid::new_v4())
    }

    /// Intake wired to a private channel; returns the channel for assertions.
    pub fn intake(&self) -> (Intake, String) {
        let channel = Self::unique_channel();
        let config = IntakeConfig {
            default_timeout: 20,
            passthrough_prefix: "NTORQUE-PASSTHROUGH-".to_string(),
            channel: channel.clone(),
        };
        let intake = Intake::new(self.store.clone(), self.notifier.clone(), config);
        (intake, channel)
    }

    pub async fn create_application(&self, name: &str) -> (Application, ApiKey) {
        self.store
            .create_application(name)
            .await
            .expect("failed to create application")
    }

    /// A minimal pending task owned by nobody.
    pub async fn create_task(&self, url: &str) -> Task {
        self.store
            .create_task(NewTask {
                app_id: None,
                url: url.to_string(),
                timeout: 20,
                method: TaskMethod::Post,
                charset: "utf8".to_string(),
                enctype: "application/x-www-form-urlencoded".to_string(),
                headers: serde_json::json!({}),
                body: "foo=bar".to_string(),
            })
            .await
            .expect("failed to create task")
    }

    /// Force a task's due instant, bypassing the policy (test fixture only).
    pub async fn set_due(&self, task_id: i64, due: DateTime<Utc>) {
        sqlx::query("UPDATE torque_tasks SET due = $2 WHERE id = $1")
            .bind(task_id)
            .bind(due)
            .execute(&self.pool)
            .await
            .expect("failed to set due");
    }

    /// Force a task's modified instant (test fixture only).
    pub async fn set_modified(&self, task_id: i64, modified: DateTime<Utc>) {
        sqlx::query("UPDATE torque_tasks SET modified = $2 WHERE id = $1")
            .bind(task_id)
            .bind(modified)
            .execute(&self.pool)
            .await
            .expect("failed to set modified");
    }

    /// Deactivate an api key (test fixture only).
    pub async fn deactivate_key(&self, key_id: i64) {
        sqlx::query(
            "UPDATE torque_api_keys SET is_active = FALSE, deactivated = NOW() WHERE id = $1",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await
        .expect("failed to deactivate key");
    }

    pub async fn reload_task(&self, task_id: i64) -> Task {
        self.store
            .lookup_task(task_id)
            .await
            .expect("failed to reload task")
            .expect("task disappeared")
    }
}
