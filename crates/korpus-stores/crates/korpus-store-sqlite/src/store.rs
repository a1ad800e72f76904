//! SQLite store wrapper
//!
//! A corpus build is a single sequential bulk load, so one connection behind
//! a mutex is enough. The store is safe to share across async tasks.

use async_trait::async_trait;
use korpus_core::{CorpusStore, KorpusError, Result, Row, SqlDialect, Value};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::sync::Arc;

/// SQLite-backed corpus store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database, creating the file if it does not exist.
    ///
    /// `":memory:"` opens a transient in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        // Expand path to handle ~ and relative paths
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            Connection::open_in_memory().map_err(|e| {
                KorpusError::Store(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            // Validate that parent directory exists for non-URI paths
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(KorpusError::Store(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            Connection::open_with_flags(&expanded_path, flags).map_err(|e| {
                KorpusError::Store(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        // WAL with relaxed sync for the write-heavy load phase
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| KorpusError::Store(format!("Failed to set journal mode: {}", e)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| KorpusError::Store(format!("Failed to set synchronous mode: {}", e)))?;

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        // Handle special cases
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        // Expand ~ to home directory
        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                let home_path = std::path::PathBuf::from(home);
                home_path.join(rest).to_string_lossy().to_string()
            } else {
                return Err(KorpusError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        } else if path.starts_with('~') {
            return Err(KorpusError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        // Convert to absolute path if relative
        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(KorpusError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    async fn has_rows(&self, table: &str) -> Result<bool> {
        let rows = self
            .query(&format!("SELECT COUNT(*) FROM {}", table))
            .await?;
        let count = rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        Ok(count > 0)
    }
}

#[async_trait]
impl CorpusStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let rows_affected = conn
            .execute(sql, [])
            .map_err(|e| KorpusError::Store(format!("Failed to execute statement: {}", e)))?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(rows_affected as u64)
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| KorpusError::Store(format!("Failed to prepare query: {}", e)))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = Vec::new();
        let mut query_rows = stmt
            .query([])
            .map_err(|e| KorpusError::Store(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = query_rows
            .next()
            .map_err(|e| KorpusError::Store(format!("Failed to fetch row: {}", e)))?
        {
            let mut values = Vec::with_capacity(column_names.len());
            for i in 0..column_names.len() {
                values.push(column_value(row, i)?);
            }
            rows.push(Row::new(column_names.clone(), values));
        }

        tracing::debug!(row_count = rows.len(), "query executed");
        Ok(rows)
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| KorpusError::Store(format!("Failed to begin transaction: {}", e)))?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );

        let mut inserted = 0u64;
        {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| KorpusError::Store(format!("Failed to prepare insert: {}", e)))?;
            for row in rows {
                let params = values_to_rusqlite(row);
                inserted += stmt
                    .execute(params_from_iter(params.iter()))
                    .map_err(|e| {
                        KorpusError::Store(format!("Failed to insert into {}: {}", table, e))
                    })? as u64;
            }
        }

        tx.commit()
            .map_err(|e| KorpusError::Store(format!("Failed to commit insert batch: {}", e)))?;

        tracing::debug!(table = %table, rows = inserted, "rows inserted");
        Ok(inserted)
    }

    #[tracing::instrument(skip(self, columns))]
    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
        _length_hint: Option<u32>,
    ) -> Result<()> {
        // Do not create an index on an empty table
        if !self.has_rows(table).await? {
            tracing::debug!(table = %table, index = %index_name, "table is empty, skipping index");
            return Ok(());
        }

        // SQLite has no prefix indexes, so the length hint is ignored
        let sql = format!("CREATE INDEX {} ON {}({})", index_name, table, columns.join(","));
        self.execute(&sql).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", table))
            .await?;
        Ok(())
    }
}

/// Convert store values to rusqlite-compatible types
fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Int(i) => rusqlite::types::Value::Integer(*i),
        Value::Float(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

/// Convert a rusqlite row value to a store value
fn column_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| KorpusError::Store(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).to_string()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_paths_pass_through() {
        assert_eq!(SqliteStore::expand_path(":memory:").unwrap(), ":memory:");
        assert_eq!(
            SqliteStore::expand_path("file:corpus.db?mode=rwc").unwrap(),
            "file:corpus.db?mode=rwc"
        );
    }

    #[test]
    fn relative_paths_become_absolute() {
        let expanded = SqliteStore::expand_path("corpus.db").unwrap();
        assert!(std::path::Path::new(&expanded).is_absolute());
        assert!(expanded.ends_with("corpus.db"));
    }

    #[test]
    fn user_home_shorthand_is_rejected() {
        assert!(SqliteStore::expand_path("~alice/corpus.db").is_err());
    }

    #[tokio::test]
    async fn execute_and_query_round_trip() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .execute("CREATE TABLE Files (FileId INT NOT NULL PRIMARY KEY, Filename TEXT)")
            .await
            .unwrap();
        store
            .execute("INSERT INTO Files VALUES (1, 'alice.txt')")
            .await
            .unwrap();

        let rows = store.query("SELECT * FROM Files").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("FileId"), Some(&Value::Int(1)));
        assert_eq!(
            rows[0].get_by_name("Filename"),
            Some(&Value::Text("alice.txt".into()))
        );
    }

    #[tokio::test]
    async fn bulk_insert_binds_all_value_kinds() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .execute("CREATE TABLE Sample (ID INT, Label TEXT, Score REAL)")
            .await
            .unwrap();

        let columns = vec!["ID".to_string(), "Label".to_string(), "Score".to_string()];
        let rows = vec![
            vec![Value::Int(1), Value::Text("it's".into()), Value::Float(0.5)],
            vec![Value::Int(2), Value::Null, Value::Float(-1.25)],
        ];
        let inserted = store.bulk_insert("Sample", &columns, &rows).await.unwrap();
        assert_eq!(inserted, 2);

        let rows = store
            .query("SELECT Label, Score FROM Sample ORDER BY ID")
            .await
            .unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Text("it's".into())));
        assert_eq!(rows[1].get(0), Some(&Value::Null));
        assert_eq!(rows[1].get(1), Some(&Value::Float(-1.25)));
    }

    #[tokio::test]
    async fn index_creation_skips_empty_tables() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .execute("CREATE TABLE Lexicon (WordId INT, Word TEXT)")
            .await
            .unwrap();

        store
            .create_index("Lexicon", "Word", &["Word".to_string()], None)
            .await
            .unwrap();
        let indexes = store
            .query("SELECT name FROM sqlite_master WHERE type = 'index'")
            .await
            .unwrap();
        assert!(indexes.is_empty());

        store
            .execute("INSERT INTO Lexicon VALUES (1, 'walk')")
            .await
            .unwrap();
        store
            .create_index("Lexicon", "Word", &["Word".to_string()], None)
            .await
            .unwrap();
        let indexes = store
            .query("SELECT name FROM sqlite_master WHERE type = 'index'")
            .await
            .unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].get(0), Some(&Value::Text("Word".into())));
    }

    #[tokio::test]
    async fn drop_table_tolerates_missing_tables() {
        let store = SqliteStore::open(":memory:").unwrap();
        store.drop_table("CorpusNgram").await.unwrap();

        store.execute("CREATE TABLE CorpusNgram (ID INT)").await.unwrap();
        store.drop_table("CorpusNgram").await.unwrap();
        let tables = store
            .query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .await
            .unwrap();
        assert!(tables.is_empty());
    }
}
