//! strata-postgres - PostgreSQL backend for strata.
//!
//! Runs the [`strata_core::Engine`] against a deadpool-managed
//! tokio-postgres pool. Every operation gets its own transaction, so a failed
//! structural change leaves no partial state in any layer.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{ColumnDef, EngineConfig};
//! use strata_postgres::{DatabaseConfig, TemporalDatabase};
//!
//! let db = TemporalDatabase::connect(DatabaseConfig::from_env()?, EngineConfig::default()).await?;
//! db.add_column("orders", ColumnDef::new("note", "text")).await?;
//! ```

mod config;
mod connection;
mod database;

pub use config::{DatabaseConfig, PoolConfig};
pub use connection::{map_db_error, PgConnection};
pub use database::TemporalDatabase;
