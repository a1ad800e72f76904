//! Store stub for unit tests that assemble SQL without executing it

use async_trait::async_trait;
use korpus_core::{CorpusStore, Result, Row, SqlDialect, Value};

pub(crate) struct NullStore;

#[async_trait]
impl CorpusStore for NullStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        Ok(0)
    }

    async fn query(&self, _sql: &str) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn bulk_insert(
        &self,
        _table: &str,
        _columns: &[String],
        _rows: &[Vec<Value>],
    ) -> Result<u64> {
        Ok(0)
    }

    async fn create_index(
        &self,
        _table: &str,
        _index_name: &str,
        _columns: &[String],
        _length_hint: Option<u32>,
    ) -> Result<()> {
        Ok(())
    }

    async fn drop_table(&self, _table: &str) -> Result<()> {
        Ok(())
    }
}
