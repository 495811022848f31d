//! strata-core - Core library for strata.
//!
//! Keeps designated PostgreSQL tables bitemporally versioned while they are
//! created, altered, renamed, promoted, demoted and dropped. Each temporal
//! table lives in three layers: a current-state table, an append-only history
//! table, and a public view whose `INSTEAD OF` triggers route writes through
//! generated versioning functions.
//!
//! # Example
//!
//! ```ignore
//! use strata_core::{ColumnDef, Engine, EngineConfig, TableDefinition};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! engine.create_schemas(&conn).await?;
//!
//! let orders = TableDefinition::new("orders")
//!     .column(ColumnDef::new("id", "serial"))
//!     .column(ColumnDef::new("total", "numeric"))
//!     .primary_key("id")
//!     .temporal(true);
//! engine.create_table(&conn, &orders).await?;
//!
//! engine.add_column(&conn, "orders", ColumnDef::new("note", "text")).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod interface;
pub mod lifecycle;
pub mod mirror;
pub mod model;
pub mod sql;
pub mod traits;
pub mod versioning;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use catalog::{LayerPresence, PhysicalIndex, RelationKind, SchemaCatalog};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{ErrorCode, StrataError, StrataResult};
pub use interface::InterfaceBuilder;
pub use lifecycle::Engine;
pub use mirror::StructuralMirror;
pub use model::{
    ColumnChange, ColumnDef, IndexDef, IndexSelector, Layer, LogicalTable, StructuralChange,
    TableChange, TableDefinition, TableKind,
};
pub use traits::{Connection, Row};
pub use versioning::{GeneratedFunction, VersioningGenerator, VersioningLogic, WriteEvent};
