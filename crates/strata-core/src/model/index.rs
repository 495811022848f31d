//! Index definitions and the deterministic naming convention.

use serde::{Deserialize, Serialize};

use crate::sql;

/// Semantic description of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique per schema.
    pub name: String,
    /// Indexed columns, in key order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// How `remove_index` identifies its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSelector {
    /// By index name.
    Name(String),
    /// By the exact ordered column list.
    Columns(Vec<String>),
}

impl IndexDef {
    /// Index on `columns` of `table`, named by convention.
    pub fn new<S: AsRef<str>>(table: &str, columns: &[S]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Self {
            name: Self::default_name(table, &columns),
            columns,
            unique: false,
        }
    }

    /// Index with an explicit name.
    pub fn named<S: AsRef<str>>(name: impl Into<String>, columns: &[S]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// `index_<table>_on_<col1>_and_<col2>`.
    pub fn default_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
        let joined = columns
            .iter()
            .map(|c| c.as_ref())
            .collect::<Vec<_>>()
            .join("_and_");
        format!("index_{}_on_{}", table, joined)
    }

    /// Copy of this index that does not enforce uniqueness.
    pub fn without_uniqueness(&self) -> Self {
        Self {
            unique: false,
            ..self.clone()
        }
    }

    /// Whether this index covers exactly `columns`, in order.
    pub fn covers<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a == b.as_ref())
    }

    /// `CREATE [UNIQUE] INDEX` on `schema.table`.
    pub fn create_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            sql::ident(&self.name),
            sql::qualified(schema, table),
            sql::ident_list(&self.columns)
        )
    }

    /// `DROP INDEX` for this index in `schema`.
    pub fn drop_sql(&self, schema: &str) -> String {
        format!("DROP INDEX {}", sql::qualified(schema, &self.name))
    }
}

impl IndexSelector {
    /// Whether `index` is the one selected.
    pub fn matches(&self, index: &IndexDef) -> bool {
        match self {
            IndexSelector::Name(name) => &index.name == name,
            IndexSelector::Columns(columns) => index.covers(columns),
        }
    }

    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            IndexSelector::Name(name) => name.clone(),
            IndexSelector::Columns(columns) => format!("on ({})", columns.join(", ")),
        }
    }
}

/// Name an index (or sequence) takes when its table is renamed.
///
/// Only conventional names are rewritten: `index_<table>_on_...` and
/// `<table>_...`. Anything else, including names that merely contain the old
/// table name, is left alone and yields `None`.
pub fn renamed_object_name(name: &str, old_table: &str, new_table: &str) -> Option<String> {
    if old_table.is_empty() || old_table == new_table {
        return None;
    }

    let convention = format!("index_{}_on_", old_table);
    if let Some(rest) = name.strip_prefix(&convention) {
        return Some(format!("index_{}_on_{}", new_table, rest));
    }
    let prefixed = format!("{}_", old_table);
    if let Some(rest) = name.strip_prefix(&prefixed) {
        return Some(format!("{}_{}", new_table, rest));
    }
    None
}
