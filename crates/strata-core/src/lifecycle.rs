//! Table lifecycle manager.
//!
//! [`Engine`] is the single entry point for structural changes. Each operation
//! runs against the connection it is given and assumes that connection is
//! bound to one transaction: a failure anywhere leaves the caller to roll
//! back, so partial propagation is never observable.

use std::collections::HashMap;

use strum::IntoEnumIterator;
use tracing::{debug, info};

use crate::catalog::{RelationKind, SchemaCatalog};
use crate::config::EngineConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::interface::InterfaceBuilder;
use crate::mirror::StructuralMirror;
use crate::model::{
    is_reserved_column, normalize_type, reserved_column_error, ColumnDef, IndexDef, IndexSelector,
    Layer, LogicalTable, StructuralChange, TableChange, TableDefinition, TableKind,
    HISTORY_COLUMNS,
};
use crate::sql;
use crate::traits::Connection;
use crate::versioning::{function_name, VersioningGenerator, VersioningLogic, WriteEvent};

/// Bitemporal versioning engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine after validating its configuration.
    pub fn new(config: EngineConfig) -> StrataResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only catalog over the configured schemas.
    pub fn catalog(&self) -> SchemaCatalog<'_> {
        SchemaCatalog::new(&self.config)
    }

    fn mirror(&self) -> StructuralMirror<'_> {
        StructuralMirror::new(&self.config)
    }

    fn generator(&self) -> VersioningGenerator<'_> {
        VersioningGenerator::new(&self.config)
    }

    fn interface(&self) -> InterfaceBuilder<'_> {
        InterfaceBuilder::new(&self.config)
    }

    /// Create the current and history schemas if they are missing.
    pub async fn create_schemas(&self, conn: &dyn Connection) -> StrataResult<()> {
        for schema in [&self.config.current_schema, &self.config.history_schema] {
            sql::execute(
                conn,
                &format!("CREATE SCHEMA IF NOT EXISTS {}", sql::ident(schema)),
            )
            .await?;
        }
        info!(
            current = %self.config.current_schema,
            history = %self.config.history_schema,
            "Schemas ready"
        );
        Ok(())
    }

    /// Create a plain or temporal table.
    pub async fn create_table(
        &self,
        conn: &dyn Connection,
        definition: &TableDefinition,
    ) -> StrataResult<()> {
        definition.validate()?;
        let name = definition.name.as_str();
        self.require_absent(conn, name).await?;

        if definition.temporal {
            let primary_key = definition.primary_key.as_deref().ok_or_else(|| {
                StrataError::internal("validated temporal definition lost its primary key")
            })?;
            sql::execute(conn, &definition.create_sql(&self.config.current_schema)).await?;
            self.mirror()
                .create_history_layer(conn, name, primary_key)
                .await?;
            self.regenerate(conn, name).await?;
        } else {
            sql::execute(conn, &definition.create_sql(&self.config.public_schema)).await?;
        }

        info!(
            "Created {} table '{}'",
            if definition.temporal { TableKind::Temporal } else { TableKind::Plain },
            name
        );
        Ok(())
    }

    /// Drop every layer of a table that exists.
    ///
    /// Fails with `NotFound` only when no layer exists at all.
    pub async fn drop_table(&self, conn: &dyn Connection, name: &str) -> StrataResult<()> {
        let presence = self.catalog().layer_presence(conn, name).await?;
        let public = presence.public.filter(|kind| *kind != RelationKind::Other);
        if public.is_none() && !presence.current && !presence.history {
            return Err(StrataError::table_not_found(name));
        }

        let public_name = sql::qualified(&self.config.public_schema, name);
        match public {
            Some(RelationKind::View) => {
                sql::execute(conn, &format!("DROP VIEW {}", public_name)).await?
            }
            Some(RelationKind::Table) => {
                sql::execute(conn, &format!("DROP TABLE {}", public_name)).await?
            }
            _ => {}
        }

        if presence.current || presence.history || public == Some(RelationKind::View) {
            self.generator().drop(conn, name).await?;
        }
        if presence.history {
            self.mirror().drop_history_layer(conn, name).await?;
        }
        if presence.current {
            sql::execute(
                conn,
                &format!(
                    "DROP TABLE {}",
                    sql::qualified(&self.config.current_schema, name)
                ),
            )
            .await?;
        }

        info!("Dropped table '{}'", name);
        Ok(())
    }

    /// Rename a table; temporal tables keep their history and get a rebuilt interface.
    pub async fn rename_table(&self, conn: &dyn Connection, old: &str, new: &str) -> StrataResult<()> {
        sql::validate_identifier(new)?;
        let table = self.describe(conn, old).await?;
        if old == new {
            return Ok(());
        }
        self.require_absent(conn, new).await?;

        if table.is_temporal() {
            self.interface().drop(conn, old).await?;
            self.mirror()
                .rename_table(conn, old, new, TableKind::Temporal)
                .await?;
            self.regenerate(conn, new).await?;
        } else {
            self.mirror()
                .rename_table(conn, old, new, TableKind::Plain)
                .await?;
        }

        info!("Renamed table '{}' to '{}'", old, new);
        Ok(())
    }

    /// Flip the classification if requested, then apply each structural change
    /// in order. Versioning logic and the interface are rebuilt once, at the end.
    pub async fn change_table(
        &self,
        conn: &dyn Connection,
        name: &str,
        change: &TableChange,
    ) -> StrataResult<()> {
        let table = self.describe(conn, name).await?;
        let mut kind = table.kind;
        let mut stale = false;

        match (change.temporal, kind) {
            (Some(true), TableKind::Plain) => {
                self.promote(conn, &table).await?;
                kind = TableKind::Temporal;
                stale = true;
            }
            (Some(false), TableKind::Temporal) => {
                self.demote(conn, name).await?;
                kind = TableKind::Plain;
            }
            _ => {}
        }

        if kind == TableKind::Temporal
            && !stale
            && change.changes.iter().any(StructuralChange::changes_columns)
        {
            // Columns referenced by the view cannot be dropped, renamed or retyped.
            self.interface().drop(conn, name).await?;
            stale = true;
        }

        let mirror = self.mirror();
        for structural in &change.changes {
            debug!(table = %name, change = ?structural, "Applying structural change");
            mirror.apply(conn, name, kind, structural).await?;
        }

        if stale {
            self.regenerate(conn, name).await?;
        }

        info!(
            table = %name,
            kind = %kind,
            changes = change.changes.len(),
            "Changed table"
        );
        Ok(())
    }

    /// Apply a single structural change.
    pub async fn apply(
        &self,
        conn: &dyn Connection,
        name: &str,
        change: StructuralChange,
    ) -> StrataResult<()> {
        self.change_table(conn, name, &TableChange::default().with(change))
            .await
    }

    pub async fn add_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        column: ColumnDef,
    ) -> StrataResult<()> {
        self.apply(conn, table, StructuralChange::AddColumn { column })
            .await
    }

    pub async fn remove_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        column: &str,
    ) -> StrataResult<()> {
        self.apply(
            conn,
            table,
            StructuralChange::RemoveColumn {
                name: column.to_string(),
            },
        )
        .await
    }

    pub async fn rename_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        from: &str,
        to: &str,
    ) -> StrataResult<()> {
        self.apply(
            conn,
            table,
            StructuralChange::RenameColumn {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
        .await
    }

    /// Change type, default or nullability of an existing column.
    pub async fn change_column(
        &self,
        conn: &dyn Connection,
        table: &str,
        column: ColumnDef,
    ) -> StrataResult<()> {
        self.apply(conn, table, StructuralChange::ChangeColumn { column })
            .await
    }

    pub async fn add_index(
        &self,
        conn: &dyn Connection,
        table: &str,
        index: IndexDef,
    ) -> StrataResult<()> {
        self.apply(conn, table, StructuralChange::AddIndex { index })
            .await
    }

    pub async fn remove_index(
        &self,
        conn: &dyn Connection,
        table: &str,
        selector: IndexSelector,
    ) -> StrataResult<()> {
        self.apply(conn, table, StructuralChange::RemoveIndex { selector })
            .await
    }

    /// Whether the table's history layer exists.
    pub async fn is_temporal(&self, conn: &dyn Connection, name: &str) -> StrataResult<bool> {
        self.catalog().is_temporal(conn, name).await
    }

    /// The logical table, reconstructed from physical state.
    pub async fn describe(&self, conn: &dyn Connection, name: &str) -> StrataResult<LogicalTable> {
        self.catalog().describe(conn, name).await
    }

    /// Logical columns in declaration order.
    pub async fn columns(&self, conn: &dyn Connection, name: &str) -> StrataResult<Vec<ColumnDef>> {
        Ok(self.describe(conn, name).await?.columns)
    }

    /// Indexes of the table backing the logical rows.
    pub async fn indexes(&self, conn: &dyn Connection, name: &str) -> StrataResult<Vec<IndexDef>> {
        Ok(self.describe(conn, name).await?.indexes)
    }

    async fn require_layer(
        &self,
        conn: &dyn Connection,
        name: &str,
        layer: Layer,
    ) -> StrataResult<&str> {
        let schema = self.config.schema_for(layer);
        match self.catalog().relation_kind(conn, schema, name).await? {
            Some(RelationKind::Table | RelationKind::View) => Ok(schema),
            _ => Err(StrataError::not_found(
                ErrorCode::TableNotFound,
                format!("{} layer of '{}' does not exist", layer, name),
            )),
        }
    }

    /// Physical columns of one layer, reserved history columns included.
    pub async fn layer_columns(
        &self,
        conn: &dyn Connection,
        name: &str,
        layer: Layer,
    ) -> StrataResult<Vec<ColumnDef>> {
        let schema = self.require_layer(conn, name, layer).await?;
        self.catalog().physical_columns(conn, schema, name).await
    }

    /// Indexes of one layer.
    pub async fn layer_indexes(
        &self,
        conn: &dyn Connection,
        name: &str,
        layer: Layer,
    ) -> StrataResult<Vec<IndexDef>> {
        let schema = self.require_layer(conn, name, layer).await?;
        self.catalog().physical_indexes(conn, schema, name).await
    }

    /// Installed source of the function handling `event` for `name`.
    pub async fn function_source(
        &self,
        conn: &dyn Connection,
        name: &str,
        event: WriteEvent,
    ) -> StrataResult<Option<String>> {
        self.catalog()
            .function_source(
                conn,
                &self.config.public_schema,
                &function_name(&self.config, name, event),
            )
            .await
    }

    /// Check that every layer agrees with the current layer. Never repairs.
    pub async fn verify(&self, conn: &dyn Connection, name: &str) -> StrataResult<()> {
        let table = self.describe(conn, name).await?;
        if !table.is_temporal() {
            return Ok(());
        }
        let catalog = self.catalog();

        let history = catalog
            .physical_columns(conn, &self.config.history_schema, name)
            .await?;
        for reserved in HISTORY_COLUMNS {
            if !history.iter().any(|c| c.name == reserved) {
                return Err(StrataError::inconsistent(
                    name,
                    format!("history layer lacks column '{}'", reserved),
                ));
            }
        }

        let history_types: HashMap<&str, String> = history
            .iter()
            .filter(|c| !is_reserved_column(&c.name))
            .map(|c| (c.name.as_str(), c.normalized_type()))
            .collect();
        if history_types.len() != table.columns.len() {
            return Err(StrataError::inconsistent(
                name,
                format!(
                    "current layer has {} columns, history layer has {}",
                    table.columns.len(),
                    history_types.len()
                ),
            ));
        }
        for column in &table.columns {
            match history_types.get(column.name.as_str()) {
                Some(ty) if *ty == normalize_type(&column.sql_type) => {}
                Some(ty) => {
                    return Err(StrataError::inconsistent(
                        name,
                        format!(
                            "column '{}' is {} in the current layer but {} in history",
                            column.name, column.sql_type, ty
                        ),
                    ))
                }
                None => {
                    return Err(StrataError::inconsistent(
                        name,
                        format!("column '{}' is missing from the history layer", column.name),
                    ))
                }
            }
        }

        let view = catalog
            .physical_columns(conn, &self.config.public_schema, name)
            .await?;
        let view_names: Vec<&str> = view.iter().map(|c| c.name.as_str()).collect();
        if view_names != table.column_names() {
            return Err(StrataError::stale_interface(
                name,
                "public view columns differ from the current layer",
            ));
        }

        for event in WriteEvent::iter() {
            if self.function_source(conn, name, event).await?.is_none() {
                return Err(StrataError::layer_missing(
                    name,
                    format!("{} function is missing", event),
                ));
            }
        }

        let logic = self.generator().generate(conn, name).await?;
        let stored = catalog.interface_fingerprint(conn, name).await?;
        if stored.as_deref() != Some(logic.fingerprint.as_str()) {
            return Err(StrataError::stale_interface(
                name,
                format!(
                    "interface fingerprint {} does not match the current layer ({})",
                    stored.as_deref().unwrap_or("<none>"),
                    logic.fingerprint
                ),
            ));
        }

        debug!(table = %name, "Layers verified");
        Ok(())
    }

    /// Rebuild versioning logic and interface if they were generated for
    /// another column set. Returns whether anything was rebuilt.
    pub async fn refresh(&self, conn: &dyn Connection, name: &str) -> StrataResult<bool> {
        let table = self.describe(conn, name).await?;
        if !table.is_temporal() {
            return Ok(false);
        }

        let logic = self.generator().generate(conn, name).await?;
        let stored = self.catalog().interface_fingerprint(conn, name).await?;
        if stored.as_deref() == Some(logic.fingerprint.as_str()) {
            debug!(table = %name, "Interface is current");
            return Ok(false);
        }

        self.install(conn, &logic).await?;
        info!("Refreshed interface of '{}'", name);
        Ok(true)
    }

    async fn require_absent(&self, conn: &dyn Connection, name: &str) -> StrataResult<()> {
        let presence = self.catalog().layer_presence(conn, name).await?;
        if presence.is_absent() {
            Ok(())
        } else {
            Err(StrataError::conflict(
                ErrorCode::DuplicateTable,
                name,
                format!("an object named '{}' already exists", name),
            ))
        }
    }

    async fn install(&self, conn: &dyn Connection, logic: &VersioningLogic) -> StrataResult<()> {
        self.generator().install(conn, logic).await?;
        self.interface().build(conn, logic).await
    }

    /// Generate logic from the current layer and (re)build the interface.
    async fn regenerate(&self, conn: &dyn Connection, name: &str) -> StrataResult<VersioningLogic> {
        let logic = self.generator().generate(conn, name).await?;
        self.install(conn, &logic).await?;
        Ok(logic)
    }

    async fn promote(&self, conn: &dyn Connection, table: &LogicalTable) -> StrataResult<()> {
        let primary_key = table.require_primary_key()?;
        if let Some(column) = table.columns.iter().find(|c| is_reserved_column(&c.name)) {
            return Err(reserved_column_error(&table.name, &column.name));
        }

        let mirror = self.mirror();
        mirror
            .move_table(conn, &table.name, Layer::Public, Layer::Current)
            .await?;
        mirror
            .create_history_layer(conn, &table.name, primary_key)
            .await?;
        mirror.copy_indexes_to_history(conn, &table.name).await?;
        mirror.seed_history(conn, &table.name).await?;

        info!("Promoted '{}' to a temporal table", table.name);
        Ok(())
    }

    async fn demote(&self, conn: &dyn Connection, name: &str) -> StrataResult<()> {
        let mirror = self.mirror();
        self.interface().drop(conn, name).await?;
        mirror.drop_history_layer(conn, name).await?;
        mirror
            .move_table(conn, name, Layer::Current, Layer::Public)
            .await?;

        info!("Demoted '{}' to a plain table", name);
        Ok(())
    }
}
