//! PL/pgSQL generation for the insert, update and delete functions.

use strum::IntoEnumIterator;
use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::config::EngineConfig;
use crate::error::{ErrorCode, StrataError, StrataResult};
use crate::model::{ColumnDef, HISTORY_ID, VALID_FROM, VALID_TO};
use crate::sql;
use crate::traits::Connection;
use crate::versioning::logic::{fingerprint, function_name};
use crate::versioning::{GeneratedFunction, VersioningLogic, WriteEvent};

/// Produces [`VersioningLogic`] from the current layer's catalog state.
pub struct VersioningGenerator<'a> {
    config: &'a EngineConfig,
    catalog: SchemaCatalog<'a>,
}

impl<'a> VersioningGenerator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            catalog: SchemaCatalog::new(config),
        }
    }

    /// Read the current layer of `table` and generate its logic.
    ///
    /// A `nextval` primary key default is resolved to the schema-qualified
    /// sequence it draws from, whether or not the column owns that sequence.
    pub async fn generate(&self, conn: &dyn Connection, table: &str) -> StrataResult<VersioningLogic> {
        let schema = &self.config.current_schema;
        let columns = self.catalog.physical_columns(conn, schema, table).await?;
        if columns.is_empty() {
            return Err(StrataError::layer_missing(
                table,
                format!("{} does not exist", sql::qualified(schema, table)),
            ));
        }

        let primary_key = self
            .catalog
            .primary_key(conn, schema, table)
            .await?
            .ok_or_else(|| {
                StrataError::validation_with_suggestion(
                    ErrorCode::ValPrimaryKeyRequired,
                    format!("{} has no primary key", sql::qualified(schema, table)),
                    "Temporal tables need a single-column primary key",
                )
            })?;

        let sequence = match columns
            .iter()
            .find(|c| c.name == primary_key)
            .and_then(ColumnDef::sequence_default)
        {
            Some(reference) => Some(self.catalog.resolve_sequence(conn, &reference).await?),
            None => None,
        };

        self.build(table, &primary_key, &columns, sequence)
    }

    /// Generate logic for an explicit column set.
    pub fn build(
        &self,
        table: &str,
        primary_key: &str,
        columns: &[ColumnDef],
        sequence: Option<(String, String)>,
    ) -> StrataResult<VersioningLogic> {
        let pk_column = columns
            .iter()
            .find(|c| c.name == primary_key)
            .ok_or_else(|| StrataError::column_not_found(table, primary_key))?;

        let fingerprint = fingerprint(table, primary_key, pk_column.default.as_deref(), columns);

        let key_default = match (&sequence, &pk_column.default) {
            (Some((schema, name)), _) => Some(format!(
                "nextval({})",
                sql::literal(&sql::qualified(schema, name))
            )),
            (None, Some(expr)) => Some(expr.clone()),
            (None, None) => None,
        };

        let body = Bodies {
            config: self.config,
            table,
            primary_key,
            columns,
        };

        let functions = WriteEvent::iter()
            .map(|event| GeneratedFunction {
                event,
                schema: self.config.public_schema.clone(),
                name: function_name(self.config, table, event),
                body: match event {
                    WriteEvent::Insert => body.insert(key_default.as_deref()),
                    WriteEvent::Update => body.update(),
                    WriteEvent::Delete => body.delete(),
                },
            })
            .collect();

        debug!(table = %table, fingerprint = %fingerprint, "Generated versioning logic");
        Ok(VersioningLogic {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            columns: columns.to_vec(),
            fingerprint,
            functions,
        })
    }

    /// Create (or replace) the functions of `logic`.
    pub async fn install(&self, conn: &dyn Connection, logic: &VersioningLogic) -> StrataResult<()> {
        for statement in logic.install_sql() {
            sql::execute(conn, &statement).await?;
        }
        Ok(())
    }

    /// `DROP FUNCTION IF EXISTS` for the three functions of `table`.
    pub fn drop_sql(&self, table: &str) -> Vec<String> {
        WriteEvent::iter()
            .map(|event| {
                format!(
                    "DROP FUNCTION IF EXISTS {}()",
                    sql::qualified(
                        &self.config.public_schema,
                        &function_name(self.config, table, event)
                    )
                )
            })
            .collect()
    }

    /// Drop the functions of `table`, if present.
    pub async fn drop(&self, conn: &dyn Connection, table: &str) -> StrataResult<()> {
        for statement in self.drop_sql(table) {
            sql::execute(conn, &statement).await?;
        }
        Ok(())
    }
}

struct Bodies<'b> {
    config: &'b EngineConfig,
    table: &'b str,
    primary_key: &'b str,
    columns: &'b [ColumnDef],
}

impl Bodies<'_> {
    fn current(&self) -> String {
        sql::qualified(&self.config.current_schema, self.table)
    }

    fn history(&self) -> String {
        sql::qualified(&self.config.history_schema, self.table)
    }

    fn pk(&self) -> String {
        sql::ident(self.primary_key)
    }

    fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| sql::ident(&c.name)).collect()
    }

    fn new_values(&self) -> String {
        self.names()
            .iter()
            .map(|n| format!("NEW.{}", n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn history_insert(&self, valid_from: &str) -> String {
        format!(
            "    INSERT INTO {} ({}, {}, {})\n    VALUES ({}, NULL, {});\n",
            self.history(),
            VALID_FROM,
            VALID_TO,
            self.names().join(", "),
            valid_from,
            self.new_values()
        )
    }

    fn lock_open_interval(&self) -> String {
        format!(
            "    SELECT {}, {} INTO _hid, _valid_from\n      FROM {}\n     WHERE {} = OLD.{} AND {} IS NULL\n       FOR UPDATE;\n",
            HISTORY_ID,
            VALID_FROM,
            self.history(),
            self.pk(),
            self.pk(),
            VALID_TO
        )
    }

    fn insert(&self, key_default: Option<&str>) -> String {
        let mut body = String::from("\nBEGIN\n");
        if let Some(default) = key_default {
            body.push_str(&format!(
                "    IF NEW.{pk} IS NULL THEN\n        NEW.{pk} := {value};\n    END IF;\n\n",
                pk = self.pk(),
                value = default
            ));
        }
        body.push_str(&format!(
            "    INSERT INTO {} ({})\n    VALUES ({});\n\n",
            self.current(),
            self.names().join(", "),
            self.new_values()
        ));
        body.push_str(&self.history_insert("now()"));
        body.push_str("\n    RETURN NEW;\nEND;\n");
        body
    }

    fn update(&self) -> String {
        let assignments = self
            .names()
            .iter()
            .map(|n| format!("{} = NEW.{}", n, n))
            .collect::<Vec<_>>()
            .join(", ");

        let mut body = String::from(
            "\nDECLARE\n    _hid bigint;\n    _valid_from timestamptz;\n    _now timestamptz;\nBEGIN\n",
        );
        body.push_str(&format!(
            "    UPDATE {}\n       SET {}\n     WHERE {} = OLD.{};\n",
            self.current(),
            assignments,
            self.pk(),
            self.pk()
        ));
        body.push_str("    IF NOT FOUND THEN\n        RETURN NULL;\n    END IF;\n\n");
        body.push_str(&self.lock_open_interval());
        body.push_str("\n    _now := greatest(now(), _valid_from);\n\n");
        body.push_str(&format!(
            "    UPDATE {} SET {} = _now WHERE {} = _hid;\n\n",
            self.history(),
            VALID_TO,
            HISTORY_ID
        ));
        body.push_str(&self.history_insert("_now"));
        body.push_str("\n    RETURN NEW;\nEND;\n");
        body
    }

    fn delete(&self) -> String {
        let mut body =
            String::from("\nDECLARE\n    _hid bigint;\n    _valid_from timestamptz;\nBEGIN\n");
        body.push_str(&format!(
            "    DELETE FROM {} WHERE {} = OLD.{};\n",
            self.current(),
            self.pk(),
            self.pk()
        ));
        body.push_str("    IF NOT FOUND THEN\n        RETURN NULL;\n    END IF;\n\n");
        body.push_str(&self.lock_open_interval());
        body.push_str(&format!(
            "\n    UPDATE {} SET {} = greatest(now(), _valid_from) WHERE {} = _hid;\n",
            self.history(),
            VALID_TO,
            HISTORY_ID
        ));
        body.push_str("\n    RETURN OLD;\nEND;\n");
        body
    }
}
