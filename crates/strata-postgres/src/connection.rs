//! `Connection` over tokio-postgres clients and transactions.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::GenericClient;

use strata_core::error::{ErrorCode, StrataError, StrataResult};
use strata_core::traits::{Connection, Row};

/// Borrowed tokio-postgres client (usually a transaction) seen as a strata [`Connection`].
pub struct PgConnection<'a, C> {
    client: &'a C,
}

impl<'a, C> PgConnection<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> Connection for PgConnection<'_, C>
where
    C: GenericClient + Sync,
{
    async fn execute(&self, sql: &str) -> StrataResult<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| map_db_error("statement failed", e))
    }

    async fn query(&self, sql: &str, params: &[String]) -> StrataResult<Vec<Row>> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = self
            .client
            .query(sql, &params)
            .await
            .map_err(|e| map_db_error("query failed", e))?;

        rows.iter()
            .map(|row| {
                let values = (0..row.len())
                    .map(|idx| row.try_get::<_, Option<String>>(idx))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| map_db_error("catalog column is not text", e))?;
                Ok(Row::new(values))
            })
            .collect()
    }
}

/// Translate a driver error, classifying well-known SQLSTATEs.
pub fn map_db_error(context: &str, err: tokio_postgres::Error) -> StrataError {
    let sqlstate = err.code().map(|state| state.code().to_string());
    let message = match err.as_db_error() {
        Some(db) => format!("{}: {}", context, db.message()),
        None => format!("{}: {}", context, err),
    };

    match sqlstate.as_deref().and_then(classify) {
        Some(Classified::Conflict(code)) => StrataError::StructuralConflict {
            message,
            code,
            object: None,
        },
        Some(Classified::Missing(code)) => StrataError::NotFound {
            message,
            code,
            object: None,
        },
        None => StrataError::backend_source(message, sqlstate, err),
    }
}

enum Classified {
    Conflict(ErrorCode),
    Missing(ErrorCode),
}

fn classify(sqlstate: &str) -> Option<Classified> {
    match sqlstate {
        // duplicate_table, duplicate_schema
        "42P07" | "42P06" => Some(Classified::Conflict(ErrorCode::DuplicateTable)),
        // duplicate_column
        "42701" => Some(Classified::Conflict(ErrorCode::DuplicateColumn)),
        // duplicate_object
        "42710" => Some(Classified::Conflict(ErrorCode::DuplicateIndex)),
        // undefined_table
        "42P01" => Some(Classified::Missing(ErrorCode::TableNotFound)),
        // undefined_column
        "42703" => Some(Classified::Missing(ErrorCode::ColumnNotFound)),
        // undefined_object
        "42704" => Some(Classified::Missing(ErrorCode::IndexNotFound)),
        _ => None,
    }
}
