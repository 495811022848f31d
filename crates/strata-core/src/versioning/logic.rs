//! Versioning logic artifacts: the three trigger functions generated for one
//! column set of one temporal table.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::config::EngineConfig;
use crate::model::{normalize_type, ColumnDef};
use crate::sql;

/// Write event routed through the public interface.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WriteEvent {
    Insert,
    Update,
    Delete,
}

impl WriteEvent {
    /// Trigger event keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// `<prefix>_<table>_<event>`; long table parts are shortened and hashed so
/// the event suffix survives.
pub fn function_name(config: &EngineConfig, table: &str, event: WriteEvent) -> String {
    sql::derived_identifier(
        &format!("{}_{}", config.function_prefix, table),
        &format!("_{}", event.as_ref()),
    )
}

/// SHA-256 hex over the inputs the generated logic depends on.
pub fn fingerprint(
    table: &str,
    primary_key: &str,
    primary_key_default: Option<&str>,
    columns: &[ColumnDef],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(table.as_bytes());
    hasher.update(b"\n");
    hasher.update(primary_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(primary_key_default.unwrap_or("").as_bytes());
    for column in columns {
        hasher.update(b"\n");
        hasher.update(column.name.as_bytes());
        hasher.update(b":");
        hasher.update(normalize_type(&column.sql_type).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// One generated trigger function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFunction {
    pub event: WriteEvent,
    pub schema: String,
    pub name: String,
    /// PL/pgSQL body, as stored in `pg_proc.prosrc`.
    pub body: String,
}

impl GeneratedFunction {
    /// Schema-qualified name.
    pub fn qualified_name(&self) -> String {
        sql::qualified(&self.schema, &self.name)
    }

    /// `CREATE OR REPLACE FUNCTION`.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE OR REPLACE FUNCTION {}() RETURNS trigger AS $strata${}$strata$ LANGUAGE plpgsql",
            self.qualified_name(),
            self.body
        )
    }

    /// `COMMENT ON FUNCTION` carrying the fingerprint.
    pub fn comment_sql(&self, fingerprint: &str) -> String {
        format!(
            "COMMENT ON FUNCTION {}() IS {}",
            self.qualified_name(),
            sql::literal(fingerprint)
        )
    }
}

/// Generated logic for one column set. Regenerated on every change, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningLogic {
    pub table: String,
    pub primary_key: String,
    /// Current-layer columns in declaration order.
    pub columns: Vec<ColumnDef>,
    pub fingerprint: String,
    pub functions: Vec<GeneratedFunction>,
}

impl VersioningLogic {
    /// Function handling `event`.
    pub fn function(&self, event: WriteEvent) -> Option<&GeneratedFunction> {
        self.functions.iter().find(|f| f.event == event)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Statements installing every function.
    pub fn install_sql(&self) -> Vec<String> {
        self.functions
            .iter()
            .flat_map(|f| [f.create_sql(), f.comment_sql(&self.fingerprint)])
            .collect()
    }
}
