//! Structural mirror: propagates one structural change to every physical
//! layer of a logical table.
//!
//! Plain tables have one layer (the public schema). Temporal tables have a
//! current layer and a history layer that must stay column-compatible: the
//! history layer carries the same logical columns (nullable, without sequence
//! defaults) and the same indexes with uniqueness stripped.

use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::config::EngineConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::model::{
    is_reserved_column, open_interval_index, renamed_object_name, reserved_column_error,
    timeline_index, ColumnChange, ColumnDef, IndexDef, IndexSelector, Layer, StructuralChange,
    TableKind, HISTORY_ID, RECORDED_AT, VALID_FROM, VALID_TO,
};
use crate::sql;
use crate::traits::Connection;

/// Applies structural changes to the current and history layers in lockstep.
pub struct StructuralMirror<'a> {
    config: &'a EngineConfig,
    catalog: SchemaCatalog<'a>,
}

impl<'a> StructuralMirror<'a> {
    /// Create a mirror for the configured schemas.
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            catalog: SchemaCatalog::new(config),
        }
    }

    /// Schema of the table that backs the logical table's rows.
    fn primary_schema(&self, kind: TableKind) -> &'a str {
        match kind {
            TableKind::Plain => &self.config.public_schema,
            TableKind::Temporal => &self.config.current_schema,
        }
    }

    fn layers(&self, kind: TableKind) -> Vec<&'a str> {
        match kind {
            TableKind::Plain => vec![self.config.public_schema.as_str()],
            TableKind::Temporal => vec![
                self.config.current_schema.as_str(),
                self.config.history_schema.as_str(),
            ],
        }
    }

    fn history(&self, table: &str) -> String {
        sql::qualified(&self.config.history_schema, table)
    }

    /// Name of the check constraint keeping history intervals well-formed.
    pub fn interval_constraint(&self) -> String {
        format!("{}_valid_interval", self.config.function_prefix)
    }

    /// Apply one structural change.
    pub async fn apply(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        change: &StructuralChange,
    ) -> StrataResult<()> {
        match change {
            StructuralChange::AddColumn { column } => {
                self.add_column(conn, table, kind, column).await
            }
            StructuralChange::RemoveColumn { name } => {
                self.remove_column(conn, table, kind, name).await
            }
            StructuralChange::RenameColumn { from, to } => {
                self.rename_column(conn, table, kind, from, to).await
            }
            StructuralChange::ChangeColumn { column } => {
                self.change_column(conn, table, kind, column).await
            }
            StructuralChange::AddIndex { index } => self.add_index(conn, table, kind, index).await,
            StructuralChange::RemoveIndex { selector } => self
                .remove_index(conn, table, kind, selector)
                .await
                .map(|_| ()),
        }
    }

    async fn existing_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        name: &str,
    ) -> StrataResult<Option<ColumnDef>> {
        let columns = self
            .catalog
            .physical_columns(conn, self.primary_schema(kind), table)
            .await?;
        Ok(columns.into_iter().find(|c| c.name == name))
    }

    async fn require_history_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        name: &str,
    ) -> StrataResult<()> {
        let history = self
            .catalog
            .physical_columns(conn, &self.config.history_schema, table)
            .await?;
        if history.iter().any(|c| c.name == name) {
            Ok(())
        } else {
            Err(StrataError::inconsistent(
                table,
                format!(
                    "column '{}' exists in the current layer but not in {}",
                    name,
                    self.history(table)
                ),
            ))
        }
    }

    async fn temporal_primary_key(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> StrataResult<Option<String>> {
        self.catalog
            .primary_key(conn, &self.config.current_schema, table)
            .await
    }

    /// Add a column; the history copy is nullable and never draws from a sequence.
    pub async fn add_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        column: &ColumnDef,
    ) -> StrataResult<()> {
        sql::validate_identifier(&column.name)?;
        if kind == TableKind::Temporal && is_reserved_column(&column.name) {
            return Err(reserved_column_error(table, &column.name));
        }
        if self
            .existing_column(conn, table, kind, &column.name)
            .await?
            .is_some()
        {
            return Err(StrataError::conflict(
                ErrorCode::DuplicateColumn,
                format!("{}.{}", table, column.name),
                format!("column '{}' already exists on '{}'", column.name, table),
            ));
        }

        debug!(table = %table, column = %column.name, "Adding column");
        let schema = self.primary_schema(kind);
        sql::execute(
            conn,
            &format!(
                "ALTER TABLE {} ADD COLUMN {}",
                sql::qualified(schema, table),
                column.to_sql()
            ),
        )
        .await?;

        if kind == TableKind::Temporal {
            sql::execute(
                conn,
                &format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.history(table),
                    column.history_mirror().to_sql()
                ),
            )
            .await?;
        }
        Ok(())
    }

    /// Drop a column from every layer. The temporal primary key cannot be dropped.
    pub async fn remove_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        name: &str,
    ) -> StrataResult<()> {
        if self.existing_column(conn, table, kind, name).await?.is_none() {
            return Err(StrataError::column_not_found(table, name));
        }

        if kind == TableKind::Temporal {
            if self.temporal_primary_key(conn, table).await?.as_deref() == Some(name) {
                return Err(StrataError::conflict(
                    ErrorCode::PrimaryKeyChange,
                    format!("{}.{}", table, name),
                    format!(
                        "column '{}' is the primary key of temporal table '{}'",
                        name, table
                    ),
                ));
            }
            self.require_history_column(conn, table, name).await?;
        }

        debug!(table = %table, column = %name, "Removing column");
        for schema in self.layers(kind) {
            sql::execute(
                conn,
                &format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    sql::qualified(schema, table),
                    sql::ident(name)
                ),
            )
            .await?;
        }
        Ok(())
    }

    /// Rename a column in every layer.
    pub async fn rename_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        from: &str,
        to: &str,
    ) -> StrataResult<()> {
        sql::validate_identifier(to)?;
        if kind == TableKind::Temporal && is_reserved_column(to) {
            return Err(reserved_column_error(table, to));
        }

        let columns = self
            .catalog
            .physical_columns(conn, self.primary_schema(kind), table)
            .await?;
        if !columns.iter().any(|c| c.name == from) {
            return Err(StrataError::column_not_found(table, from));
        }
        if columns.iter().any(|c| c.name == to) {
            return Err(StrataError::conflict(
                ErrorCode::DuplicateColumn,
                format!("{}.{}", table, to),
                format!("column '{}' already exists on '{}'", to, table),
            ));
        }
        if kind == TableKind::Temporal {
            self.require_history_column(conn, table, from).await?;
        }

        debug!(table = %table, from = %from, to = %to, "Renaming column");
        for schema in self.layers(kind) {
            sql::execute(
                conn,
                &format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    sql::qualified(schema, table),
                    sql::ident(from),
                    sql::ident(to)
                ),
            )
            .await?;
        }
        Ok(())
    }

    /// Bring a column in line with `target`.
    ///
    /// Type and default changes apply to both layers; nullability only to the
    /// current layer.
    pub async fn change_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        target: &ColumnDef,
    ) -> StrataResult<()> {
        let existing = self
            .existing_column(conn, table, kind, &target.name)
            .await?
            .ok_or_else(|| StrataError::column_not_found(table, &target.name))?;

        let changes = existing.diff(target);
        if changes.is_empty() {
            debug!(table = %table, column = %target.name, "Column already matches");
            return Ok(());
        }

        debug!(table = %table, column = %target.name, changes = changes.len(), "Changing column");
        let schema = self.primary_schema(kind);
        sql::execute(
            conn,
            &alter_columns_sql(&sql::qualified(schema, table), &target.name, &changes),
        )
        .await?;

        if kind == TableKind::Temporal {
            self.require_history_column(conn, table, &target.name).await?;
            let mirror = target.history_mirror();
            let history_changes: Vec<ColumnChange> = changes
                .into_iter()
                .filter(ColumnChange::mirrors_to_history)
                .map(|change| match change {
                    ColumnChange::Default(_) => ColumnChange::Default(mirror.default.clone()),
                    other => other,
                })
                .collect();

            if !history_changes.is_empty() {
                sql::execute(
                    conn,
                    &alter_columns_sql(&self.history(table), &target.name, &history_changes),
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Create an index; the history layer gets the same name without uniqueness.
    pub async fn add_index(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        index: &IndexDef,
    ) -> StrataResult<()> {
        sql::validate_identifier(&index.name)?;
        if index.columns.is_empty() {
            return Err(StrataError::validation(format!(
                "index '{}' must cover at least one column",
                index.name
            )));
        }

        let schema = self.primary_schema(kind);
        let existing = self.catalog.index_names(conn, schema, table).await?;
        if existing.contains(&index.name) {
            return Err(StrataError::conflict(
                ErrorCode::DuplicateIndex,
                index.name.clone(),
                format!("index '{}' already exists on '{}'", index.name, table),
            ));
        }

        debug!(table = %table, index = %index.name, unique = index.unique, "Adding index");
        sql::execute(conn, &index.create_sql(schema, table)).await?;
        if kind == TableKind::Temporal {
            sql::execute(
                conn,
                &index
                    .without_uniqueness()
                    .create_sql(&self.config.history_schema, table),
            )
            .await?;
        }
        Ok(())
    }

    /// Drop an index from every layer and return what was dropped.
    ///
    /// The history counterpart is found by name, or failing that by covering
    /// the same columns.
    pub async fn remove_index(
        &self,
        conn: &dyn Connection,
        table: &str,
        kind: TableKind,
        selector: &IndexSelector,
    ) -> StrataResult<IndexDef> {
        let schema = self.primary_schema(kind);
        let target = self
            .catalog
            .physical_indexes(conn, schema, table)
            .await?
            .into_iter()
            .find(|idx| selector.matches(idx))
            .ok_or_else(|| {
                StrataError::index_not_found(&sql::qualified(schema, table), &selector.describe())
            })?;

        let history_target = if kind == TableKind::Temporal {
            let history = self
                .catalog
                .physical_indexes(conn, &self.config.history_schema, table)
                .await?;
            let found = history
                .iter()
                .find(|idx| idx.name == target.name)
                .or_else(|| history.iter().find(|idx| idx.covers(&target.columns)))
                .cloned();
            Some(found.ok_or_else(|| {
                StrataError::inconsistent(
                    table,
                    format!(
                        "index '{}' has no counterpart in {}",
                        target.name,
                        self.history(table)
                    ),
                )
            })?)
        } else {
            None
        };

        debug!(table = %table, index = %target.name, "Removing index");
        sql::execute(conn, &target.drop_sql(schema)).await?;
        if let Some(history_index) = history_target {
            sql::execute(conn, &history_index.drop_sql(&self.config.history_schema)).await?;
        }
        Ok(target)
    }

    /// Rename the table in every layer, along with each index and owned
    /// sequence whose name embeds the old table name.
    pub async fn rename_table(
        &self,
        conn: &dyn Connection,
        old: &str,
        new: &str,
        kind: TableKind,
    ) -> StrataResult<()> {
        for schema in self.layers(kind) {
            let indexes = self.catalog.index_names(conn, schema, old).await?;
            let sequences = self.catalog.owned_sequences(conn, schema, old).await?;

            debug!(schema = %schema, from = %old, to = %new, "Renaming table");
            sql::execute(
                conn,
                &format!(
                    "ALTER TABLE {} RENAME TO {}",
                    sql::qualified(schema, old),
                    sql::ident(new)
                ),
            )
            .await?;

            for index in indexes {
                if let Some(renamed) = self.renamed_index(schema, &index, old, new) {
                    sql::execute(
                        conn,
                        &format!(
                            "ALTER INDEX {} RENAME TO {}",
                            sql::qualified(schema, &index),
                            sql::ident(&sql::truncate_identifier(&renamed))
                        ),
                    )
                    .await?;
                }
            }

            for sequence in sequences {
                if let Some(renamed) = renamed_object_name(&sequence, old, new) {
                    sql::execute(
                        conn,
                        &format!(
                            "ALTER SEQUENCE {} RENAME TO {}",
                            sql::qualified(schema, &sequence),
                            sql::ident(&sql::truncate_identifier(&renamed))
                        ),
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// New name of `index` on `schema.old` once the table is called `new`.
    fn renamed_index(&self, schema: &str, index: &str, old: &str, new: &str) -> Option<String> {
        if schema == self.config.history_schema {
            if index == open_interval_index(old) {
                return Some(open_interval_index(new));
            }
            if index == timeline_index(old) {
                return Some(timeline_index(new));
            }
        }
        renamed_object_name(index, old, new)
    }

    /// `CREATE TABLE` for the history layer of `table` with `columns`.
    pub fn history_table_sql(&self, table: &str, columns: &[ColumnDef]) -> String {
        let mut clauses = vec![
            format!("{} bigserial PRIMARY KEY", HISTORY_ID),
            format!("{} timestamp with time zone NOT NULL", VALID_FROM),
            format!("{} timestamp with time zone", VALID_TO),
            format!(
                "{} timestamp with time zone NOT NULL DEFAULT clock_timestamp()",
                RECORDED_AT
            ),
        ];
        clauses.extend(columns.iter().map(|c| c.history_mirror().to_sql()));
        clauses.push(format!(
            "CONSTRAINT {} CHECK ({} IS NULL OR {} >= {})",
            sql::ident(&self.interval_constraint()),
            VALID_TO,
            VALID_TO,
            VALID_FROM
        ));

        format!("CREATE TABLE {} ({})", self.history(table), clauses.join(", "))
    }

    /// Internal history indexes: one open interval per identity, and timeline scans.
    pub fn internal_indexes_sql(&self, table: &str, primary_key: &str) -> Vec<String> {
        let pk = sql::ident(primary_key);
        vec![
            format!(
                "CREATE UNIQUE INDEX {} ON {} ({}) WHERE {} IS NULL",
                sql::ident(&open_interval_index(table)),
                self.history(table),
                pk,
                VALID_TO
            ),
            format!(
                "CREATE INDEX {} ON {} ({}, {})",
                sql::ident(&timeline_index(table)),
                self.history(table),
                pk,
                VALID_FROM
            ),
        ]
    }

    /// Create the history layer from the current layer's catalog state.
    pub async fn create_history_layer(
        &self,
        conn: &dyn Connection,
        table: &str,
        primary_key: &str,
    ) -> StrataResult<()> {
        let columns = self
            .catalog
            .physical_columns(conn, &self.config.current_schema, table)
            .await?;
        if columns.is_empty() {
            return Err(StrataError::layer_missing(
                table,
                format!(
                    "{} has no columns to mirror",
                    sql::qualified(&self.config.current_schema, table)
                ),
            ));
        }
        if let Some(reserved) = columns.iter().find(|c| is_reserved_column(&c.name)) {
            return Err(reserved_column_error(table, &reserved.name));
        }

        debug!(table = %table, columns = columns.len(), "Creating history layer");
        sql::execute(conn, &self.history_table_sql(table, &columns)).await?;
        for statement in self.internal_indexes_sql(table, primary_key) {
            sql::execute(conn, &statement).await?;
        }
        Ok(())
    }

    /// Re-create the current layer's indexes on the history layer, uniqueness stripped.
    pub async fn copy_indexes_to_history(
        &self,
        conn: &dyn Connection,
        table: &str,
    ) -> StrataResult<Vec<IndexDef>> {
        let indexes = self
            .catalog
            .physical_indexes(conn, &self.config.current_schema, table)
            .await?;

        let mut copied = Vec::with_capacity(indexes.len());
        for index in indexes {
            let history_index = index.without_uniqueness();
            sql::execute(
                conn,
                &history_index.create_sql(&self.config.history_schema, table),
            )
            .await?;
            copied.push(history_index);
        }
        debug!(table = %table, count = copied.len(), "Copied indexes to history");
        Ok(copied)
    }

    /// Open one interval per current row, all starting at the transaction's `now()`.
    pub async fn seed_history(&self, conn: &dyn Connection, table: &str) -> StrataResult<()> {
        let columns = self
            .catalog
            .physical_columns(conn, &self.config.current_schema, table)
            .await?;
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let list = sql::ident_list(&names);

        debug!(table = %table, "Seeding history");
        sql::execute(
            conn,
            &format!(
                "INSERT INTO {} ({}, {}) SELECT now(), {} FROM {}",
                self.history(table),
                VALID_FROM,
                list,
                list,
                sql::qualified(&self.config.current_schema, table)
            ),
        )
        .await
    }

    /// Drop the history table with all its versions.
    pub async fn drop_history_layer(&self, conn: &dyn Connection, table: &str) -> StrataResult<()> {
        debug!(table = %table, "Dropping history layer");
        sql::execute(conn, &format!("DROP TABLE {}", self.history(table))).await
    }

    /// Move a table between layers; its indexes and owned sequences follow.
    pub async fn move_table(
        &self,
        conn: &dyn Connection,
        table: &str,
        from: Layer,
        to: Layer,
    ) -> StrataResult<()> {
        debug!(table = %table, from = %from, to = %to, "Moving table");
        sql::execute(
            conn,
            &format!(
                "ALTER TABLE {} SET SCHEMA {}",
                sql::qualified(self.config.schema_for(from), table),
                sql::ident(self.config.schema_for(to))
            ),
        )
        .await
    }
}

fn alter_columns_sql(qualified_table: &str, column: &str, changes: &[ColumnChange]) -> String {
    let clauses: Vec<String> = changes.iter().map(|c| c.to_sql(column)).collect();
    format!("ALTER TABLE {} {}", qualified_table, clauses.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{executed, FakeCatalog};

    fn orders_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "integer")
                .not_null()
                .with_default("nextval('temporal.orders_id_seq'::regclass)"),
            ColumnDef::new("total", "numeric").with_default("0"),
        ]
    }

    fn temporal_orders() -> FakeCatalog {
        FakeCatalog::new()
            .table("temporal", "orders")
            .table("history", "orders")
            .columns("temporal", "orders", &orders_columns())
            .columns("history", "orders", &orders_columns())
            .primary_key("temporal", "orders", "id")
    }

    #[test]
    fn test_history_table_sql() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        assert_eq!(
            mirror.history_table_sql("orders", &orders_columns()),
            "CREATE TABLE history.orders (hid bigserial PRIMARY KEY, \
             valid_from timestamp with time zone NOT NULL, \
             valid_to timestamp with time zone, \
             recorded_at timestamp with time zone NOT NULL DEFAULT clock_timestamp(), \
             id integer, total numeric DEFAULT 0, \
             CONSTRAINT strata_valid_interval CHECK (valid_to IS NULL OR valid_to >= valid_from))"
        );
    }

    #[test]
    fn test_internal_indexes_sql() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        assert_eq!(
            mirror.internal_indexes_sql("orders", "id"),
            vec![
                "CREATE UNIQUE INDEX orders_history_open ON history.orders (id) WHERE valid_to IS NULL",
                "CREATE INDEX orders_history_timeline ON history.orders (id, valid_from)",
            ]
        );
    }

    #[tokio::test]
    async fn test_add_column_reaches_both_layers() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        let column = ColumnDef::new("status", "text")
            .not_null()
            .with_default("'new'::text");
        mirror
            .add_column(&conn, "orders", TableKind::Temporal, &column)
            .await
            .unwrap();

        assert_eq!(
            executed(&log),
            vec![
                "ALTER TABLE temporal.orders ADD COLUMN status text NOT NULL DEFAULT 'new'::text",
                "ALTER TABLE history.orders ADD COLUMN status text DEFAULT 'new'::text",
            ]
        );
    }

    #[tokio::test]
    async fn test_add_column_plain_touches_one_layer() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = FakeCatalog::new()
            .table("public", "foo")
            .columns("public", "foo", &[ColumnDef::new("id", "integer")])
            .connection();

        mirror
            .add_column(&conn, "foo", TableKind::Plain, &ColumnDef::new("bar", "integer"))
            .await
            .unwrap();
        assert_eq!(
            executed(&log),
            vec!["ALTER TABLE public.foo ADD COLUMN bar integer"]
        );
    }

    #[tokio::test]
    async fn test_add_duplicate_or_reserved_column_is_rejected() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        let err = mirror
            .add_column(&conn, "orders", TableKind::Temporal, &ColumnDef::new("total", "integer"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateColumn);

        let err = mirror
            .add_column(&conn, "orders", TableKind::Temporal, &ColumnDef::new("valid_to", "date"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReservedName);
        assert!(executed(&log).is_empty());
    }

    #[tokio::test]
    async fn test_remove_primary_key_of_temporal_table_is_rejected() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        let err = mirror
            .remove_column(&conn, "orders", TableKind::Temporal, "id")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PrimaryKeyChange);

        mirror
            .remove_column(&conn, "orders", TableKind::Temporal, "total")
            .await
            .unwrap();
        assert_eq!(
            executed(&log),
            vec![
                "ALTER TABLE temporal.orders DROP COLUMN total",
                "ALTER TABLE history.orders DROP COLUMN total",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_history_column_is_inconsistent() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders()
            .columns("history", "orders", &orders_columns()[..1])
            .connection();

        let err = mirror
            .rename_column(&conn, "orders", TableKind::Temporal, "total", "amount")
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InconsistentLayerState { .. }));
        assert!(executed(&log).is_empty());
    }

    #[tokio::test]
    async fn test_change_column_keeps_history_nullable() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        let target = ColumnDef::new("total", "float").not_null().with_default("1.5");
        mirror
            .change_column(&conn, "orders", TableKind::Temporal, &target)
            .await
            .unwrap();

        assert_eq!(
            executed(&log),
            vec![
                "ALTER TABLE temporal.orders ALTER COLUMN total TYPE float USING total::float, \
                 ALTER COLUMN total SET DEFAULT 1.5, ALTER COLUMN total SET NOT NULL",
                "ALTER TABLE history.orders ALTER COLUMN total TYPE float USING total::float, \
                 ALTER COLUMN total SET DEFAULT 1.5",
            ]
        );
    }

    #[tokio::test]
    async fn test_add_unique_index_is_not_unique_in_history() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        let index = IndexDef::new("orders", &["total"]).unique();
        mirror
            .add_index(&conn, "orders", TableKind::Temporal, &index)
            .await
            .unwrap();

        assert_eq!(
            executed(&log),
            vec![
                "CREATE UNIQUE INDEX index_orders_on_total ON temporal.orders (total)",
                "CREATE INDEX index_orders_on_total ON history.orders (total)",
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_index_correlates_history_by_columns() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders()
            .index("temporal", "orders", &IndexDef::named("test_index", &["total"]))
            .index("history", "orders", &IndexDef::named("legacy_total_idx", &["total"]))
            .connection();

        let removed = mirror
            .remove_index(
                &conn,
                "orders",
                TableKind::Temporal,
                &IndexSelector::Columns(vec!["total".into()]),
            )
            .await
            .unwrap();
        assert_eq!(removed.name, "test_index");
        assert_eq!(
            executed(&log),
            vec![
                "DROP INDEX temporal.test_index",
                "DROP INDEX history.legacy_total_idx",
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_index_missing_in_history_is_inconsistent() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders()
            .index("temporal", "orders", &IndexDef::named("test_index", &["total"]))
            .connection();

        let err = mirror
            .remove_index(
                &conn,
                "orders",
                TableKind::Temporal,
                &IndexSelector::Name("test_index".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InconsistentLayerState { .. }));
        assert!(executed(&log).is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_index_is_not_found() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, _log) = temporal_orders().connection();

        let err = mirror
            .remove_index(
                &conn,
                "orders",
                TableKind::Temporal,
                &IndexSelector::Name("nope".into()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::IndexNotFound);
    }

    #[tokio::test]
    async fn test_rename_table_renames_indexes_and_sequences() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders()
            .index("temporal", "orders", &IndexDef::new("orders", &["total"]))
            .index("temporal", "orders", &IndexDef::named("test_index", &["total"]))
            .owned_sequence("temporal", "orders", "orders_id_seq")
            .primary_key("history", "orders", "hid")
            .index("history", "orders", &IndexDef::named("orders_history_open", &["id"]))
            .owned_sequence("history", "orders", "orders_hid_seq")
            .connection();

        mirror
            .rename_table(&conn, "orders", "invoices", TableKind::Temporal)
            .await
            .unwrap();

        assert_eq!(
            executed(&log),
            vec![
                "ALTER TABLE temporal.orders RENAME TO invoices",
                "ALTER INDEX temporal.orders_pkey RENAME TO invoices_pkey",
                "ALTER INDEX temporal.index_orders_on_total RENAME TO index_invoices_on_total",
                "ALTER SEQUENCE temporal.orders_id_seq RENAME TO invoices_id_seq",
                "ALTER TABLE history.orders RENAME TO invoices",
                "ALTER INDEX history.orders_pkey RENAME TO invoices_pkey",
                "ALTER INDEX history.orders_history_open RENAME TO invoices_history_open",
                "ALTER SEQUENCE history.orders_hid_seq RENAME TO invoices_hid_seq",
            ]
        );
    }

    #[tokio::test]
    async fn test_rename_long_table_rederives_internal_indexes() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let old = "o".repeat(60);
        let new = "n".repeat(60);
        let (conn, log) = FakeCatalog::new()
            .table("history", &old)
            .index("history", &old, &IndexDef::named(open_interval_index(&old), &["id"]))
            .index("history", &old, &IndexDef::named(timeline_index(&old), &["id", "valid_from"]))
            .connection();

        mirror
            .rename_table(&conn, &old, &new, TableKind::Temporal)
            .await
            .unwrap();

        let statements = executed(&log);
        assert!(statements.contains(&format!(
            "ALTER INDEX history.{} RENAME TO {}",
            open_interval_index(&old),
            open_interval_index(&new)
        )));
        assert!(statements.contains(&format!(
            "ALTER INDEX history.{} RENAME TO {}",
            timeline_index(&old),
            timeline_index(&new)
        )));
    }

    #[tokio::test]
    async fn test_seed_history_uses_one_timestamp() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders().connection();

        mirror.seed_history(&conn, "orders").await.unwrap();
        assert_eq!(
            executed(&log),
            vec![
                "INSERT INTO history.orders (valid_from, id, total) \
                 SELECT now(), id, total FROM temporal.orders"
            ]
        );
    }

    #[tokio::test]
    async fn test_copy_indexes_strips_uniqueness() {
        let config = EngineConfig::default();
        let mirror = StructuralMirror::new(&config);
        let (conn, log) = temporal_orders()
            .index("temporal", "orders", &IndexDef::new("orders", &["total"]).unique())
            .connection();

        let copied = mirror.copy_indexes_to_history(&conn, "orders").await.unwrap();
        assert_eq!(copied.len(), 1);
        assert!(!copied[0].unique);
        assert_eq!(
            executed(&log),
            vec!["CREATE INDEX index_orders_on_total ON history.orders (total)"]
        );
    }
}
