//! Logical tables, their classification, and structural edits.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::model::{ColumnDef, IndexDef, IndexSelector};
use crate::sql;

/// History-layer surrogate key, strictly increasing across all writes.
pub const HISTORY_ID: &str = "hid";
/// Start of the validity interval.
pub const VALID_FROM: &str = "valid_from";
/// End of the validity interval; NULL while the version is current.
pub const VALID_TO: &str = "valid_to";
/// Wall-clock time the history row was physically written.
pub const RECORDED_AT: &str = "recorded_at";

/// Columns every history table carries in addition to the logical ones.
pub const HISTORY_COLUMNS: [&str; 4] = [HISTORY_ID, VALID_FROM, VALID_TO, RECORDED_AT];

/// Whether `name` collides with a reserved history column.
pub fn is_reserved_column(name: &str) -> bool {
    HISTORY_COLUMNS.contains(&name)
}

/// Partial unique index allowing one open interval per identity.
pub fn open_interval_index(table: &str) -> String {
    sql::derived_identifier(table, "_history_open")
}

/// Index supporting per-identity timeline scans.
pub fn timeline_index(table: &str) -> String {
    sql::derived_identifier(table, "_history_timeline")
}

/// Classification of a logical table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TableKind {
    /// One physical table under the public name.
    Plain,
    /// Current layer, history layer and a public interface.
    Temporal,
}

/// One of the three physical namespaces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Layer {
    /// Interface objects named after logical tables (and plain tables).
    Public,
    /// Present-state rows of temporal tables.
    Current,
    /// Every version of every row of temporal tables.
    History,
}

/// Input to `create_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Logical table name.
    pub name: String,
    /// Columns, in declaration order.
    pub columns: Vec<ColumnDef>,
    /// Primary key column; required for temporal tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Whether the table is versioned.
    #[serde(default)]
    pub temporal: bool,
}

impl TableDefinition {
    /// Start an empty plain table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            temporal: false,
        }
    }

    /// Append a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Set the temporal flag.
    pub fn temporal(mut self, temporal: bool) -> Self {
        self.temporal = temporal;
        self
    }

    /// Check names, uniqueness, the primary key and reserved columns.
    pub fn validate(&self) -> StrataResult<()> {
        sql::validate_identifier(&self.name)?;

        if self.columns.is_empty() {
            return Err(StrataError::validation(format!(
                "table '{}' must declare at least one column",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            sql::validate_identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(StrataError::conflict(
                    ErrorCode::DuplicateColumn,
                    format!("{}.{}", self.name, column.name),
                    format!("column '{}' is declared twice", column.name),
                ));
            }
            if self.temporal && is_reserved_column(&column.name) {
                return Err(reserved_column_error(&self.name, &column.name));
            }
        }

        match &self.primary_key {
            Some(pk) if !seen.contains(pk.as_str()) => Err(StrataError::validation(format!(
                "primary key '{}' is not a column of '{}'",
                pk, self.name
            ))),
            None if self.temporal => Err(StrataError::validation_with_suggestion(
                ErrorCode::ValPrimaryKeyRequired,
                format!("temporal table '{}' has no primary key", self.name),
                "Declare a single-column primary key such as `id serial`",
            )),
            _ => Ok(()),
        }
    }

    /// `CREATE TABLE schema.name (...)`.
    pub fn create_sql(&self, schema: &str) -> String {
        let mut clauses: Vec<String> = self.columns.iter().map(ColumnDef::to_sql).collect();
        if let Some(pk) = &self.primary_key {
            clauses.push(format!("PRIMARY KEY ({})", sql::ident(pk)));
        }
        format!(
            "CREATE TABLE {} ({})",
            sql::qualified(schema, &self.name),
            clauses.join(", ")
        )
    }
}

/// A logical table as reconstructed from physical state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalTable {
    /// Logical table name.
    pub name: String,
    /// Classification.
    pub kind: TableKind,
    /// Columns, in declaration order (the current layer's for temporal tables).
    pub columns: Vec<ColumnDef>,
    /// Indexes of the table that backs the public name.
    pub indexes: Vec<IndexDef>,
    /// Primary key column, if any.
    pub primary_key: Option<String>,
}

impl LogicalTable {
    /// Whether the table is versioned.
    pub fn is_temporal(&self) -> bool {
        self.kind == TableKind::Temporal
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names, in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up an index.
    pub fn index(&self, selector: &IndexSelector) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| selector.matches(i))
    }

    /// The primary key, or a validation error for versioning purposes.
    pub fn require_primary_key(&self) -> StrataResult<&str> {
        self.primary_key.as_deref().ok_or_else(|| {
            StrataError::validation_with_suggestion(
                ErrorCode::ValPrimaryKeyRequired,
                format!("table '{}' has no single-column primary key", self.name),
                "Add a primary key before making the table temporal",
            )
        })
    }
}

/// One structural edit on a logical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StructuralChange {
    AddColumn { column: ColumnDef },
    RemoveColumn { name: String },
    RenameColumn { from: String, to: String },
    ChangeColumn { column: ColumnDef },
    AddIndex { index: IndexDef },
    RemoveIndex { selector: IndexSelector },
}

impl StructuralChange {
    /// Whether the edit changes the column set the versioning logic depends on.
    pub fn changes_columns(&self) -> bool {
        !matches!(
            self,
            StructuralChange::AddIndex { .. } | StructuralChange::RemoveIndex { .. }
        )
    }
}

/// Input to `change_table`: an optional classification flip, then edits in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChange {
    /// `Some(true)` promotes, `Some(false)` demotes, `None` keeps the kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<bool>,
    /// Edits applied after the flip.
    #[serde(default)]
    pub changes: Vec<StructuralChange>,
}

impl TableChange {
    /// Only flip the classification.
    pub fn temporal(temporal: bool) -> Self {
        Self {
            temporal: Some(temporal),
            changes: Vec::new(),
        }
    }

    /// Append an edit.
    pub fn with(mut self, change: StructuralChange) -> Self {
        self.changes.push(change);
        self
    }
}

pub(crate) fn reserved_column_error(table: &str, column: &str) -> StrataError {
    StrataError::conflict(
        ErrorCode::ReservedName,
        format!("{}.{}", table, column),
        format!(
            "column '{}' is reserved by the history layer ({})",
            column,
            HISTORY_COLUMNS.join(", ")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableDefinition {
        TableDefinition::new("orders")
            .column(ColumnDef::new("id", "serial"))
            .column(ColumnDef::new("total", "numeric"))
            .primary_key("id")
            .temporal(true)
    }

    #[test]
    fn test_valid_definition() {
        assert!(orders().validate().is_ok());
    }

    #[test]
    fn test_internal_index_names_stay_distinct_for_long_tables() {
        assert_eq!(open_interval_index("orders"), "orders_history_open");
        assert_eq!(timeline_index("orders"), "orders_history_timeline");

        let table = "t".repeat(63);
        let open = open_interval_index(&table);
        let timeline = timeline_index(&table);
        assert_ne!(open, timeline);
        assert!(open.len() <= sql::MAX_IDENTIFIER_BYTES);
        assert!(timeline.len() <= sql::MAX_IDENTIFIER_BYTES);
        assert!(open.ends_with("_history_open"));
        assert!(timeline.ends_with("_history_timeline"));
    }

    #[test]
    fn test_temporal_requires_primary_key() {
        let mut def = orders();
        def.primary_key = None;
        let err = def.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValPrimaryKeyRequired);

        def.temporal = false;
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_duplicate_and_reserved_columns() {
        let dup = orders().column(ColumnDef::new("total", "integer"));
        assert_eq!(dup.validate().unwrap_err().code(), ErrorCode::DuplicateColumn);

        let reserved = orders().column(ColumnDef::new("valid_from", "date"));
        assert_eq!(reserved.validate().unwrap_err().code(), ErrorCode::ReservedName);
    }

    #[test]
    fn test_create_sql() {
        assert_eq!(
            orders().create_sql("temporal"),
            "CREATE TABLE temporal.orders (id serial, total numeric, PRIMARY KEY (id))"
        );
    }

    #[test]
    fn test_kind_and_layer_strings() {
        assert_eq!(TableKind::Temporal.to_string(), "temporal");
        assert_eq!(Layer::History.as_ref(), "history");
        assert_eq!("current".parse::<Layer>().unwrap(), Layer::Current);
    }

    #[test]
    fn test_structural_change_serde() {
        let change: StructuralChange =
            serde_json::from_str(r#"{"op":"rename_column","from":"foo","to":"bar"}"#).unwrap();
        assert_eq!(
            change,
            StructuralChange::RenameColumn {
                from: "foo".into(),
                to: "bar".into()
            }
        );
        assert!(change.changes_columns());
    }
}
