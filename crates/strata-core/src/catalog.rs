//! Schema catalog: read-only view of the three physical layers.
//!
//! Classification is always derived from physical state (the presence of the
//! history table), never from a stored flag, so a database left behind by a
//! failed migration is still described truthfully.

use crate::config::EngineConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::model::{
    open_interval_index, timeline_index, ColumnDef, IndexDef, Layer, LogicalTable, TableKind,
};
use crate::traits::{Connection, Row};

pub(crate) const RELATION_KIND_SQL: &str = "\
SELECT c.relkind::text \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE n.nspname::text = $1 AND c.relname::text = $2";

pub(crate) const COLUMNS_SQL: &str = "\
SELECT a.attname::text, \
       pg_catalog.format_type(a.atttypid, a.atttypmod), \
       (NOT a.attnotnull)::text, \
       pg_catalog.pg_get_expr(d.adbin, d.adrelid) \
FROM pg_catalog.pg_attribute a \
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE n.nspname::text = $1 AND c.relname::text = $2 \
  AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

pub(crate) const INDEXES_SQL: &str = "\
SELECT i.relname::text, \
       ix.indisunique::text, \
       ix.indisprimary::text, \
       array_to_json(ARRAY( \
           SELECT a.attname::text \
           FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
           JOIN pg_catalog.pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum \
           ORDER BY k.ord \
       ))::text, \
       (ix.indpred IS NOT NULL OR ix.indexprs IS NOT NULL)::text \
FROM pg_catalog.pg_index ix \
JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
WHERE n.nspname::text = $1 AND t.relname::text = $2 \
ORDER BY i.relname";

pub(crate) const OWNED_SEQUENCES_SQL: &str = "\
SELECT s.relname::text \
FROM pg_catalog.pg_class s \
JOIN pg_catalog.pg_depend d ON d.objid = s.oid \
     AND d.classid = 'pg_catalog.pg_class'::regclass \
     AND d.refclassid = 'pg_catalog.pg_class'::regclass \
JOIN pg_catalog.pg_class t ON t.oid = d.refobjid \
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
WHERE s.relkind = 'S' AND d.deptype IN ('a', 'i') \
  AND n.nspname::text = $1 AND t.relname::text = $2 \
ORDER BY s.relname";

pub(crate) const RESOLVE_SEQUENCE_SQL: &str = "\
SELECT n.nspname::text, c.relname::text \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE c.oid = pg_catalog.to_regclass($1) AND c.relkind = 'S'";

pub(crate) const FUNCTION_SOURCE_SQL: &str = "\
SELECT p.prosrc \
FROM pg_catalog.pg_proc p \
JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace \
WHERE n.nspname::text = $1 AND p.proname::text = $2";

pub(crate) const RELATION_COMMENT_SQL: &str = "\
SELECT pg_catalog.obj_description(c.oid, 'pg_class') \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE n.nspname::text = $1 AND c.relname::text = $2";

/// Kind of relation found under a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Ordinary or partitioned table.
    Table,
    /// View.
    View,
    /// Anything else (sequence, index, materialized view, ...).
    Other,
}

impl RelationKind {
    fn from_relkind(relkind: &str) -> Self {
        match relkind {
            "r" | "p" => RelationKind::Table,
            "v" => RelationKind::View,
            _ => RelationKind::Other,
        }
    }
}

/// Which physical objects exist for a logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerPresence {
    /// Relation under the public name, if any.
    pub public: Option<RelationKind>,
    /// Whether the current-layer table exists.
    pub current: bool,
    /// Whether the history-layer table exists.
    pub history: bool,
}

impl LayerPresence {
    /// Whether no trace of the table exists in any layer.
    pub fn is_absent(&self) -> bool {
        self.public.is_none() && !self.current && !self.history
    }
}

/// One index as seen by the catalog, including the ones the model hides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalIndex {
    /// Semantic definition.
    pub def: IndexDef,
    /// Backs the primary key.
    pub primary: bool,
    /// Partial or expression index (not representable as an [`IndexDef`]).
    pub complex: bool,
}

/// Read-only access to table, column, index and function metadata.
pub struct SchemaCatalog<'a> {
    config: &'a EngineConfig,
}

impl<'a> SchemaCatalog<'a> {
    /// Create a catalog reader for the configured schemas.
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Kind of the relation `schema.name`, if it exists.
    pub async fn relation_kind(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Option<RelationKind>> {
        let rows = conn.query(RELATION_KIND_SQL, &params(schema, name)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .map(RelationKind::from_relkind))
    }

    /// Whether `schema.name` is a table.
    pub async fn table_exists(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<bool> {
        Ok(self.relation_kind(conn, schema, name).await? == Some(RelationKind::Table))
    }

    /// Which layers hold an object for `name`.
    pub async fn layer_presence(
        &self,
        conn: &dyn Connection,
        name: &str,
    ) -> StrataResult<LayerPresence> {
        let public = self
            .relation_kind(conn, &self.config.public_schema, name)
            .await?;
        let current = self
            .table_exists(conn, &self.config.current_schema, name)
            .await?;
        let history = self
            .table_exists(conn, &self.config.history_schema, name)
            .await?;
        Ok(LayerPresence {
            public,
            current,
            history,
        })
    }

    /// Whether `name` is temporal: true exactly when its history table exists.
    pub async fn is_temporal(&self, conn: &dyn Connection, name: &str) -> StrataResult<bool> {
        self.table_exists(conn, &self.config.history_schema, name)
            .await
    }

    /// Columns of `schema.name` in declaration order.
    pub async fn physical_columns(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<ColumnDef>> {
        let rows = conn.query(COLUMNS_SQL, &params(schema, name)).await?;
        rows.iter().map(column_from_row).collect()
    }

    /// Every index on `schema.name`, including primary key and partial indexes.
    pub async fn all_indexes(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<PhysicalIndex>> {
        let rows = conn.query(INDEXES_SQL, &params(schema, name)).await?;
        rows.iter().map(index_from_row).collect()
    }

    /// Indexes of `schema.name` that the model represents.
    ///
    /// Primary key indexes, partial/expression indexes and the history layer's
    /// internal indexes are left out.
    pub async fn physical_indexes(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<IndexDef>> {
        let internal = if schema == self.config.history_schema {
            vec![open_interval_index(name), timeline_index(name)]
        } else {
            Vec::new()
        };

        Ok(self
            .all_indexes(conn, schema, name)
            .await?
            .into_iter()
            .filter(|idx| !idx.primary && !idx.complex && !internal.contains(&idx.def.name))
            .map(|idx| idx.def)
            .collect())
    }

    /// Names of every index on `schema.name`.
    pub async fn index_names(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<String>> {
        Ok(self
            .all_indexes(conn, schema, name)
            .await?
            .into_iter()
            .map(|idx| idx.def.name)
            .collect())
    }

    /// Primary key columns of `schema.name`, in key order.
    pub async fn primary_key_columns(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<String>> {
        Ok(self
            .all_indexes(conn, schema, name)
            .await?
            .into_iter()
            .find(|idx| idx.primary)
            .map(|idx| idx.def.columns)
            .unwrap_or_default())
    }

    /// The single primary key column of `schema.name`.
    ///
    /// Composite keys are rejected; the versioning logic addresses rows by one column.
    pub async fn primary_key(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Option<String>> {
        let mut columns = self.primary_key_columns(conn, schema, name).await?;
        match columns.len() {
            0 => Ok(None),
            1 => Ok(columns.pop()),
            _ => Err(StrataError::validation_with_suggestion(
                ErrorCode::ValPrimaryKeyRequired,
                format!(
                    "{}.{} has a composite primary key ({})",
                    schema,
                    name,
                    columns.join(", ")
                ),
                "Use a single-column primary key for temporal tables",
            )),
        }
    }

    /// Sequences owned by columns of `schema.name`.
    pub async fn owned_sequences(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Vec<String>> {
        let rows = conn.query(OWNED_SEQUENCES_SQL, &params(schema, name)).await?;
        rows.iter()
            .map(|row| row.text(0).map(str::to_string))
            .collect()
    }

    /// Resolve a sequence reference as written in a `nextval()` default to
    /// `(schema, name)`, whether or not a column owns it.
    pub async fn resolve_sequence(
        &self,
        conn: &dyn Connection,
        reference: &str,
    ) -> StrataResult<(String, String)> {
        let rows = conn
            .query(RESOLVE_SEQUENCE_SQL, &[reference.to_string()])
            .await?;
        let row = rows.first().ok_or_else(|| {
            StrataError::not_found(
                ErrorCode::SequenceNotFound,
                format!("sequence '{}' does not exist", reference),
            )
        })?;
        Ok((row.text(0)?.to_string(), row.text(1)?.to_string()))
    }

    /// Source of a function in `schema`.
    pub async fn function_source(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Option<String>> {
        let rows = conn.query(FUNCTION_SOURCE_SQL, &params(schema, name)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .map(str::to_string))
    }

    /// Comment attached to `schema.name`.
    pub async fn relation_comment(
        &self,
        conn: &dyn Connection,
        schema: &str,
        name: &str,
    ) -> StrataResult<Option<String>> {
        let rows = conn.query(RELATION_COMMENT_SQL, &params(schema, name)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .map(str::to_string))
    }

    /// Fingerprint the public interface of `name` was built for.
    pub async fn interface_fingerprint(
        &self,
        conn: &dyn Connection,
        name: &str,
    ) -> StrataResult<Option<String>> {
        self.relation_comment(conn, &self.config.public_schema, name)
            .await
    }

    /// Reconstruct the logical table from physical state.
    pub async fn describe(&self, conn: &dyn Connection, name: &str) -> StrataResult<LogicalTable> {
        let presence = self.layer_presence(conn, name).await?;

        let (kind, layer) = if presence.history {
            if !presence.current {
                return Err(StrataError::layer_missing(
                    name,
                    format!(
                        "history table exists but current table {}.{} is missing",
                        self.config.current_schema, name
                    ),
                ));
            }
            if presence.public != Some(RelationKind::View) {
                return Err(StrataError::layer_missing(
                    name,
                    format!(
                        "public interface {}.{} is missing or is not a view",
                        self.config.public_schema, name
                    ),
                ));
            }
            (TableKind::Temporal, Layer::Current)
        } else if presence.current || presence.public == Some(RelationKind::View) {
            return Err(StrataError::inconsistent(
                name,
                "current layer or public view exists without a history table",
            ));
        } else if presence.public == Some(RelationKind::Table) {
            (TableKind::Plain, Layer::Public)
        } else {
            return Err(StrataError::table_not_found(name));
        };

        let schema = self.config.schema_for(layer);
        let columns = self.physical_columns(conn, schema, name).await?;
        let indexes = self.physical_indexes(conn, schema, name).await?;
        let pk = self.primary_key_columns(conn, schema, name).await?;
        let primary_key = match pk.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        };

        Ok(LogicalTable {
            name: name.to_string(),
            kind,
            columns,
            indexes,
            primary_key,
        })
    }
}

fn params(schema: &str, name: &str) -> [String; 2] {
    [schema.to_string(), name.to_string()]
}

fn column_from_row(row: &Row) -> StrataResult<ColumnDef> {
    Ok(ColumnDef {
        name: row.text(0)?.to_string(),
        sql_type: row.text(1)?.to_string(),
        nullable: row.flag(2),
        default: row.get(3).map(str::to_string),
    })
}

fn index_from_row(row: &Row) -> StrataResult<PhysicalIndex> {
    let columns: Vec<String> = serde_json::from_str(row.text(3)?)?;
    Ok(PhysicalIndex {
        def: IndexDef {
            name: row.text(0)?.to_string(),
            columns,
            unique: row.flag(1),
        },
        primary: row.flag(2),
        complex: row.flag(4),
    })
}
