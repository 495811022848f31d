//! Scripted catalog answers for unit tests.
//!
//! A `FakeCatalog` answers the catalog queries from fixed data keyed by
//! `(schema, name)` and records every executed statement. Reads are not
//! affected by the recorded DDL, so a test scripts the state each read is
//! expected to observe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::catalog::{
    COLUMNS_SQL, FUNCTION_SOURCE_SQL, INDEXES_SQL, OWNED_SEQUENCES_SQL, RELATION_COMMENT_SQL,
    RELATION_KIND_SQL, RESOLVE_SEQUENCE_SQL,
};
use crate::model::{ColumnDef, IndexDef};
use crate::traits::{MockConnection, Row};

type Key = (String, String);

fn key(schema: &str, name: &str) -> Key {
    (schema.to_string(), name.to_string())
}

/// Executed statements, in order.
pub(crate) type StatementLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeCatalog {
    relations: HashMap<Key, &'static str>,
    columns: HashMap<Key, Vec<Row>>,
    indexes: HashMap<Key, Vec<Row>>,
    sequences: HashMap<Key, Vec<Row>>,
    resolved: HashMap<String, Row>,
    comments: HashMap<Key, Row>,
    functions: HashMap<Key, Row>,
}

impl FakeCatalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn table(mut self, schema: &str, name: &str) -> Self {
        self.relations.insert(key(schema, name), "r");
        self
    }

    pub(crate) fn view(mut self, schema: &str, name: &str) -> Self {
        self.relations.insert(key(schema, name), "v");
        self
    }

    pub(crate) fn columns(mut self, schema: &str, name: &str, columns: &[ColumnDef]) -> Self {
        let rows = columns
            .iter()
            .map(|c| {
                Row::new(vec![
                    Some(c.name.clone()),
                    Some(c.sql_type.clone()),
                    Some(c.nullable.to_string()),
                    c.default.clone(),
                ])
            })
            .collect();
        self.columns.insert(key(schema, name), rows);
        self
    }

    fn index_row(mut self, schema: &str, table: &str, index: &IndexDef, primary: bool) -> Self {
        let columns = serde_json::to_string(&index.columns).unwrap();
        let row = Row::new(vec![
            Some(index.name.clone()),
            Some(index.unique.to_string()),
            Some(primary.to_string()),
            Some(columns),
            Some("false".to_string()),
        ]);
        self.indexes.entry(key(schema, table)).or_default().push(row);
        self
    }

    pub(crate) fn index(self, schema: &str, table: &str, index: &IndexDef) -> Self {
        self.index_row(schema, table, index, false)
    }

    pub(crate) fn primary_key(self, schema: &str, table: &str, column: &str) -> Self {
        let pkey = IndexDef::named(format!("{}_pkey", table), &[column]).unique();
        self.index_row(schema, table, &pkey, true)
    }

    pub(crate) fn owned_sequence(mut self, schema: &str, table: &str, sequence: &str) -> Self {
        self.sequences
            .entry(key(schema, table))
            .or_default()
            .push(Row::from_strs(&[sequence]));
        self
    }

    pub(crate) fn sequence(mut self, reference: &str, schema: &str, name: &str) -> Self {
        self.resolved
            .insert(reference.to_string(), Row::from_strs(&[schema, name]));
        self
    }

    pub(crate) fn comment(mut self, schema: &str, name: &str, text: &str) -> Self {
        self.comments.insert(key(schema, name), Row::from_strs(&[text]));
        self
    }

    pub(crate) fn function(mut self, schema: &str, name: &str, source: &str) -> Self {
        self.functions
            .insert(key(schema, name), Row::from_strs(&[source]));
        self
    }

    /// Answer catalog queries on `conn` and record every executed statement.
    pub(crate) fn install(self, conn: &mut MockConnection) -> StatementLog {
        let log: StatementLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        conn.expect_execute().returning(move |sql| {
            sink.lock().unwrap().push(sql.to_string());
            Ok(())
        });
        conn.expect_query()
            .returning(move |sql, params| Ok(self.answer(sql, params)));
        log
    }

    /// A mock connection answering from this catalog.
    pub(crate) fn connection(self) -> (MockConnection, StatementLog) {
        let mut conn = MockConnection::new();
        let log = self.install(&mut conn);
        (conn, log)
    }

    fn answer(&self, sql: &str, params: &[String]) -> Vec<Row> {
        if sql == RESOLVE_SEQUENCE_SQL {
            return self.resolved.get(&params[0]).cloned().into_iter().collect();
        }

        let k = key(&params[0], &params[1]);
        match sql {
            RELATION_KIND_SQL => self
                .relations
                .get(&k)
                .map(|kind| vec![Row::from_strs(&[*kind])])
                .unwrap_or_default(),
            COLUMNS_SQL => self.columns.get(&k).cloned().unwrap_or_default(),
            INDEXES_SQL => self.indexes.get(&k).cloned().unwrap_or_default(),
            OWNED_SEQUENCES_SQL => self.sequences.get(&k).cloned().unwrap_or_default(),
            RELATION_COMMENT_SQL => self.comments.get(&k).cloned().into_iter().collect(),
            FUNCTION_SOURCE_SQL => self.functions.get(&k).cloned().into_iter().collect(),
            other => panic!("unexpected query: {other}"),
        }
    }
}

/// Snapshot of the statements executed so far.
pub(crate) fn executed(log: &StatementLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
