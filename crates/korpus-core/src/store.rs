//! Store abstraction over the supported database backends

use crate::{Result, Row, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// SQL dialect spoken by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlDialect {
    /// MySQL/MariaDB
    MySql,
    /// SQLite
    Sqlite,
}

impl SqlDialect {
    /// Get display name for this SQL dialect
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "MySQL",
            SqlDialect::Sqlite => "SQLite",
        }
    }

    /// Quote an identifier the way this dialect expects in generated DDL
    pub fn quote(&self, ident: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", ident),
            SqlDialect::Sqlite => ident.to_string(),
        }
    }

    /// SQL function returning the character length of a string
    pub fn length_function(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "CHAR_LENGTH",
            SqlDialect::Sqlite => "length",
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Render a value as a SQL literal for the given dialect.
///
/// MySQL interprets backslashes in string literals, SQLite does not;
/// both accept doubled single quotes.
pub fn sql_literal(value: &Value, dialect: SqlDialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => {
            let escaped = match dialect {
                SqlDialect::MySql => s.replace('\\', "\\\\").replace('\'', "''"),
                SqlDialect::Sqlite => s.replace('\'', "''"),
            };
            format!("'{}'", escaped)
        }
    }
}

/// Narrow interface the builder uses to talk to a database.
///
/// Stores do not open themselves lazily; a constructed store is expected
/// to hold a usable connection for the whole builder run.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// The SQL dialect this store speaks
    fn dialect(&self) -> SqlDialect;

    /// Execute a statement, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query and collect all result rows
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Append rows to a table in one statement
    async fn bulk_insert(&self, table: &str, columns: &[String], rows: &[Vec<Value>])
    -> Result<u64>;

    /// Create an index over the given columns.
    ///
    /// `length_hint` is the key prefix length for TEXT columns on backends
    /// that require one; backends without prefix indexes ignore it.
    /// Indexing an empty table is a no-op.
    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
        length_hint: Option<u32>,
    ) -> Result<()>;

    /// Drop a table if it exists
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Release the underlying connection.
    ///
    /// Backends that hold pooled connections override this; the default
    /// is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_escape_quotes() {
        let v = Value::Text("it's".into());
        assert_eq!(sql_literal(&v, SqlDialect::Sqlite), "'it''s'");
        assert_eq!(sql_literal(&v, SqlDialect::MySql), "'it''s'");
    }

    #[test]
    fn mysql_literals_escape_backslashes() {
        let v = Value::Text(r"a\b".into());
        assert_eq!(sql_literal(&v, SqlDialect::MySql), r"'a\\b'");
        assert_eq!(sql_literal(&v, SqlDialect::Sqlite), r"'a\b'");
    }

    #[test]
    fn non_text_literals() {
        assert_eq!(sql_literal(&Value::Null, SqlDialect::Sqlite), "NULL");
        assert_eq!(sql_literal(&Value::Int(-3), SqlDialect::MySql), "-3");
    }

    #[test]
    fn quoting_differs_by_dialect() {
        assert_eq!(SqlDialect::MySql.quote("Word"), "`Word`");
        assert_eq!(SqlDialect::Sqlite.quote("Word"), "Word");
    }
}
