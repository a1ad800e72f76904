//! Scripted in-memory store used by the unit tests

use crate::{CorpusStore, Result, Row, SqlDialect, Value};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every call and answers queries from a list of
/// (needle, rows) pairs matched against the SQL text.
pub(crate) struct RecordingStore {
    dialect: SqlDialect,
    pub executed: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<String>>,
    pub inserts: Mutex<Vec<(String, Vec<String>, Vec<Vec<Value>>)>>,
    pub indexes: Mutex<Vec<String>>,
    pub dropped: Mutex<Vec<String>>,
    responses: Vec<(String, Vec<Row>)>,
}

impl RecordingStore {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            executed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            indexes: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
            responses: Vec::new(),
        }
    }

    /// Answer any query containing `needle` with the given rows.
    /// Earlier registrations win.
    pub fn respond(mut self, needle: &str, rows: Vec<Row>) -> Self {
        self.responses.push((needle.to_string(), rows));
        self
    }

    /// A single-cell result set
    pub fn single(value: Value) -> Vec<Row> {
        vec![Row::new(vec!["value".into()], vec![value])]
    }

    /// A one-row, two-cell result set
    pub fn pair(a: Value, b: Value) -> Vec<Row> {
        vec![Row::new(vec!["min".into(), "max".into()], vec![a, b])]
    }
}

#[async_trait]
impl CorpusStore for RecordingStore {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.executed.lock().expect("lock").push(sql.to_string());
        Ok(0)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.queries.lock().expect("lock").push(sql.to_string());
        for (needle, rows) in &self.responses {
            if sql.contains(needle.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        self.inserts
            .lock()
            .expect("lock")
            .push((table.to_string(), columns.to_vec(), rows.to_vec()));
        Ok(rows.len() as u64)
    }

    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
        length_hint: Option<u32>,
    ) -> Result<()> {
        self.indexes.lock().expect("lock").push(format!(
            "{} ON {}({}){}",
            index_name,
            table,
            columns.join(","),
            length_hint.map(|n| format!(" len={}", n)).unwrap_or_default()
        ));
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.dropped.lock().expect("lock").push(table.to_string());
        Ok(())
    }
}
