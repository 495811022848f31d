//! Connection trait - the injected transactional context.

use async_trait::async_trait;

use crate::error::{StrataError, StrataResult};

/// One result row, every column rendered as text (or NULL).
///
/// Catalog queries cast their output columns to `text`, which keeps the seam
/// independent of any driver's type system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    /// Create a row from column values.
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Build a row from non-null string values.
    pub fn from_strs(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| Some(v.to_string())).collect(),
        }
    }

    /// Get a column value, `None` for NULL or out of range.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Get a required column value.
    pub fn text(&self, idx: usize) -> StrataResult<&str> {
        self.get(idx).ok_or_else(|| {
            StrataError::internal(format!("catalog row is missing column {}", idx))
        })
    }

    /// Interpret a column as a PostgreSQL boolean rendered as text.
    pub fn flag(&self, idx: usize) -> bool {
        matches!(self.get(idx), Some("true" | "t"))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Core Connection trait - every backend implements this.
///
/// Implementations are expected to be bound to an open transaction; the
/// engine never begins, commits or rolls back on its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute one or more statements without parameters.
    async fn execute(&self, sql: &str) -> StrataResult<()>;

    /// Run a query with text parameters, returning text-rendered rows.
    async fn query(&self, sql: &str, params: &[String]) -> StrataResult<Vec<Row>>;
}
