//! Public interface builder.
//!
//! A temporal table is reached under its logical name through a view over the
//! current layer. `INSTEAD OF` triggers route writes to the generated
//! versioning functions. The view is always rebuilt wholesale.

use strum::IntoEnumIterator;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::StrataResult;
use crate::sql;
use crate::traits::Connection;
use crate::versioning::{function_name, VersioningGenerator, VersioningLogic, WriteEvent};

/// Builds and drops the view-plus-triggers interface of temporal tables.
pub struct InterfaceBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> InterfaceBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn view(&self, table: &str) -> String {
        sql::qualified(&self.config.public_schema, table)
    }

    /// Name of the trigger routing `event`.
    pub fn trigger_name(&self, event: WriteEvent) -> String {
        format!("{}_{}", self.config.function_prefix, event)
    }

    /// Statements (re)creating the interface for `logic`.
    pub fn build_sql(&self, logic: &VersioningLogic) -> Vec<String> {
        let view = self.view(&logic.table);
        let mut statements = vec![
            format!("DROP VIEW IF EXISTS {}", view),
            format!(
                "CREATE VIEW {} AS SELECT {} FROM {}",
                view,
                sql::ident_list(&logic.column_names()),
                sql::qualified(&self.config.current_schema, &logic.table)
            ),
        ];

        // The insert function assigns the primary key itself.
        for column in logic.columns.iter().filter(|c| c.name != logic.primary_key) {
            if let Some(default) = &column.default {
                statements.push(format!(
                    "ALTER VIEW {} ALTER COLUMN {} SET DEFAULT {}",
                    view,
                    sql::ident(&column.name),
                    default
                ));
            }
        }

        for event in WriteEvent::iter() {
            statements.push(format!(
                "CREATE TRIGGER {} INSTEAD OF {} ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
                sql::ident(&self.trigger_name(event)),
                event.keyword(),
                view,
                sql::qualified(
                    &self.config.public_schema,
                    &function_name(self.config, &logic.table, event)
                )
            ));
        }

        statements.push(format!(
            "COMMENT ON VIEW {} IS {}",
            view,
            sql::literal(&logic.fingerprint)
        ));
        statements
    }

    /// (Re)create the interface for `logic`. Its functions must already exist.
    pub async fn build(&self, conn: &dyn Connection, logic: &VersioningLogic) -> StrataResult<()> {
        debug!(table = %logic.table, fingerprint = %logic.fingerprint, "Building public interface");
        for statement in self.build_sql(logic) {
            sql::execute(conn, &statement).await?;
        }
        Ok(())
    }

    /// Drop the view (its triggers go with it) and the versioning functions.
    pub async fn drop(&self, conn: &dyn Connection, table: &str) -> StrataResult<()> {
        debug!(table = %table, "Dropping public interface");
        sql::execute(conn, &format!("DROP VIEW IF EXISTS {}", self.view(table))).await?;
        VersioningGenerator::new(self.config).drop(conn, table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDef;
    use crate::testing::{executed, FakeCatalog};

    fn logic(config: &EngineConfig) -> VersioningLogic {
        let columns = vec![
            ColumnDef::new("id", "integer")
                .not_null()
                .with_default("nextval('temporal.orders_id_seq'::regclass)"),
            ColumnDef::new("total", "numeric").with_default("0"),
            ColumnDef::new("note", "text"),
        ];
        VersioningGenerator::new(config)
            .build("orders", "id", &columns, Some(("temporal".into(), "orders_id_seq".into())))
            .unwrap()
    }

    #[test]
    fn test_build_sql() {
        let config = EngineConfig::default();
        let builder = InterfaceBuilder::new(&config);
        let logic = logic(&config);

        let statements = builder.build_sql(&logic);
        assert_eq!(
            &statements[..3],
            &[
                "DROP VIEW IF EXISTS public.orders".to_string(),
                "CREATE VIEW public.orders AS SELECT id, total, note FROM temporal.orders".to_string(),
                "ALTER VIEW public.orders ALTER COLUMN total SET DEFAULT 0".to_string(),
            ]
        );
        assert_eq!(
            statements[4],
            "CREATE TRIGGER strata_update INSTEAD OF UPDATE ON public.orders \
             FOR EACH ROW EXECUTE FUNCTION public.strata_orders_update()"
        );
        assert_eq!(
            statements.last().unwrap(),
            &format!("COMMENT ON VIEW public.orders IS '{}'", logic.fingerprint)
        );
        assert_eq!(statements.len(), 7);
    }

    #[tokio::test]
    async fn test_drop_removes_view_and_functions() {
        let config = EngineConfig::default();
        let builder = InterfaceBuilder::new(&config);
        let (conn, log) = FakeCatalog::new().connection();

        builder.drop(&conn, "orders").await.unwrap();
        assert_eq!(
            executed(&log),
            vec![
                "DROP VIEW IF EXISTS public.orders",
                "DROP FUNCTION IF EXISTS public.strata_orders_insert()",
                "DROP FUNCTION IF EXISTS public.strata_orders_update()",
                "DROP FUNCTION IF EXISTS public.strata_orders_delete()",
            ]
        );
    }
}
