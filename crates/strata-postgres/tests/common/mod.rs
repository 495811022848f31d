//! Shared setup for PostgreSQL integration tests.
//!
//! Every test gets its own `public`/`current`/`history` schema triple so tests
//! can run in parallel against one database.

#![allow(dead_code)]

use strata_core::{EngineConfig, StrataResult};
use strata_postgres::{map_db_error, DatabaseConfig, TemporalDatabase};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

pub fn get_test_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").ok()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("strata_core=debug,strata_postgres=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub struct TestContext {
    pub db: TemporalDatabase,
    pub config: EngineConfig,
}

impl TestContext {
    /// Connect and create a fresh schema triple, or `None` without `DATABASE_URL`.
    pub async fn setup() -> StrataResult<Option<Self>> {
        let url = match get_test_url() {
            Some(url) => url,
            None => return Ok(None),
        };
        init_tracing();

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        let config = EngineConfig::builder()
            .public_schema(format!("strata_{}_public", suffix))
            .current_schema(format!("strata_{}_current", suffix))
            .history_schema(format!("strata_{}_history", suffix))
            .build()?;

        let db = TemporalDatabase::connect(
            DatabaseConfig::new(url).lock_timeout_ms(10_000),
            config.clone(),
        )
        .await?;

        let ctx = Self { db, config };
        ctx.execute(&format!("CREATE SCHEMA {}", ctx.config.public_schema))
            .await?;
        ctx.db.create_schemas().await?;
        Ok(Some(ctx))
    }

    pub fn public(&self, table: &str) -> String {
        format!("{}.{}", self.config.public_schema, table)
    }

    pub fn current(&self, table: &str) -> String {
        format!("{}.{}", self.config.current_schema, table)
    }

    pub fn history(&self, table: &str) -> String {
        format!("{}.{}", self.config.history_schema, table)
    }

    /// Run statements outside the engine.
    pub async fn execute(&self, sql: &str) -> StrataResult<()> {
        let client = self.db.client().await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| map_db_error("test statement failed", e))
    }

    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StrataResult<Vec<Row>> {
        let client = self.db.client().await?;
        client
            .query(sql, params)
            .await
            .map_err(|e| map_db_error("test query failed", e))
    }

    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StrataResult<Row> {
        let client = self.db.client().await?;
        client
            .query_one(sql, params)
            .await
            .map_err(|e| map_db_error("test query failed", e))
    }

    pub async fn count(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StrataResult<i64> {
        Ok(self.query_one(sql, params).await?.get(0))
    }

    pub async fn teardown(self) -> StrataResult<()> {
        self.execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE; DROP SCHEMA IF EXISTS {} CASCADE; DROP SCHEMA IF EXISTS {} CASCADE",
            self.config.public_schema, self.config.current_schema, self.config.history_schema
        ))
        .await
    }
}
