//! Database service for shop-service.

use crate::error::CoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::sequence::CounterKey;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

pub type Tx = Transaction<'static, Postgres>;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "shop-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Start a read-write transaction at the default isolation level.
    pub async fn begin(&self) -> Result<Tx, CoreError> {
        Ok(self.pool.begin().await?)
    }

    /// Start a read-only transaction whose reads share one snapshot.
    pub async fn begin_read(&self) -> Result<Tx, CoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    // -------------------------------------------------------------------------
    // Tenant Provisioning
    // -------------------------------------------------------------------------

    /// Seed every counter for a tenant. Safe to call again; existing
    /// counters keep their values.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn provision_tenant(&self, tenant_id: Uuid) -> Result<(), CoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["provision_tenant"])
            .start_timer();

        let keys: Vec<&str> = CounterKey::ALL.iter().map(|k| k.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO sequences (tenant_id, counter_key, value)
            SELECT $1, key, 0 FROM UNNEST($2::text[]) AS key
            ON CONFLICT (tenant_id, counter_key) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(&keys)
        .execute(&self.pool)
        .await?;

        timer.observe_duration();

        info!(counters = keys.len(), "Tenant provisioned");

        Ok(())
    }
}
