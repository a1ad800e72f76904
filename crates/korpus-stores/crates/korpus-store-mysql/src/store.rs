//! MySQL store wrapper
//!
//! Rows are rendered as SQL literals and shipped in multi-row INSERT
//! statements, which keeps the load path on the text protocol and far away
//! from per-row round trips.

use async_trait::async_trait;
use korpus_core::{CorpusStore, KorpusError, Result, Row, SqlDialect, Value, sql_literal};
use mysql_async::{
    Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row as MySqlRow,
    consts::ColumnType, prelude::*,
};

/// Rows per INSERT statement, bounded so statements stay well under
/// max_allowed_packet even for wide tables.
const INSERT_CHUNK_ROWS: usize = 1000;

/// MySQL-backed corpus store
pub struct MySqlStore {
    pool: Pool,
}

impl MySqlStore {
    /// Connect to a MySQL database
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        tracing::info!(host = %host, port = %port, database = %database, "connecting to MySQL database");

        let mut opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(host)
            .tcp_port(port)
            .db_name(Some(database));

        if let Some(u) = user {
            opts_builder = opts_builder.user(Some(u));
        }
        if let Some(p) = password {
            opts_builder = opts_builder.pass(Some(p));
        }

        // A corpus build is a single sequential load, so one connection is enough
        let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
            KorpusError::Store("Failed to configure MySQL pool constraints (min=1, max=1)".into())
        })?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(false);
        opts_builder = opts_builder.pool_opts(pool_opts);

        let pool = Pool::new(Opts::from(opts_builder));

        // Verify connectivity by acquiring and releasing a connection
        let _conn = pool
            .get_conn()
            .await
            .map_err(|e| KorpusError::Store(format!("Failed to connect to MySQL: {}", e)))?;

        tracing::info!(host = %host, port = %port, database = %database, "MySQL connection established");
        Ok(Self { pool })
    }

    async fn get_conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| KorpusError::Store(format!("Failed to get MySQL connection: {}", e)))
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
impl CorpusStore for MySqlStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        conn.query_drop(sql)
            .await
            .map_err(|e| KorpusError::Store(format!("Failed to execute statement: {}", e)))?;

        let rows_affected = conn.affected_rows();
        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(rows_affected)
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let mut conn = self.get_conn().await?;
        let mysql_rows: Vec<MySqlRow> = conn
            .query(sql)
            .await
            .map_err(|e| KorpusError::Store(format!("Failed to execute query: {}", e)))?;

        let mut rows = Vec::with_capacity(mysql_rows.len());
        for row in mysql_rows {
            let column_names: Vec<String> = row
                .columns_ref()
                .iter()
                .map(|col| col.name_str().to_string())
                .collect();
            let column_types: Vec<ColumnType> = row
                .columns_ref()
                .iter()
                .map(|col| col.column_type())
                .collect();

            let mut values = Vec::with_capacity(column_names.len());
            for (idx, col_type) in column_types.iter().enumerate() {
                let raw = row.as_ref(idx).cloned().unwrap_or(mysql_async::Value::NULL);
                values.push(mysql_value(raw, *col_type));
            }
            rows.push(Row::new(column_names, values));
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

        let mut conn = self.get_conn().await?;
        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let sql = render_insert(table, columns, chunk);
            conn.query_drop(&sql).await.map_err(|e| {
                KorpusError::Store(format!("Failed to insert into {}: {}", table, e))
            })?;
            inserted += conn.affected_rows();
        }

        tracing::debug!(table = %table, rows = inserted, "rows inserted");
        Ok(inserted)
    }

    #[tracing::instrument(skip(self, columns))]
    async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
        length_hint: Option<u32>,
    ) -> Result<()> {
        // Do not create an index on an empty table
        if !self.has_rows(table).await? {
            tracing::debug!(table = %table, index = %index_name, "table is empty, skipping index");
            return Ok(());
        }

        // TEXT keys need a prefix length on MySQL
        let columns = match (length_hint, columns.first()) {
            (Some(length), Some(first)) => vec![format!("{}({})", first, length)],
            _ => columns.to_vec(),
        };

        let sql = format!("CREATE INDEX {} ON {}({})", index_name, table, columns.join(","));
        self.execute(&sql).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", table))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing MySQL connection pool");
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| KorpusError::Store(format!("Failed to close MySQL pool: {}", e)))
    }
}

/// Render a multi-row INSERT statement with literal values
fn render_insert(table: &str, columns: &[String], rows: &[Vec<Value>]) -> String {
    let tuples = rows
        .iter()
        .map(|row| {
            let rendered = row
                .iter()
                .map(|value| sql_literal(value, SqlDialect::MySql))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", rendered)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        tuples
    )
}

/// Convert a mysql_async value to a store value, using column type metadata
/// to interpret byte strings from the text protocol.
fn mysql_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int).unwrap_or(Value::Text(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT
                | ColumnType::MYSQL_TYPE_DOUBLE
                | ColumnType::MYSQL_TYPE_DECIMAL
                | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    s.parse::<f64>().map(Value::Float).unwrap_or(Value::Text(s))
                }
                _ => Value::Text(s),
            },
            Err(e) => Value::Text(String::from_utf8_lossy(&e.into_bytes()).to_string()),
        },
        mysql_async::Value::Int(i) => Value::Int(i),
        mysql_async::Value::UInt(u) => {
            if u <= i64::MAX as u64 {
                Value::Int(u as i64)
            } else {
                Value::Text(u.to_string())
            }
        }
        mysql_async::Value::Float(f) => Value::Float(f as f64),
        mysql_async::Value::Double(d) => Value::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                Value::Text(format!("{:04}-{:02}-{:02}", year, month, day))
            } else {
                Value::Text(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                ))
            }
        }
        mysql_async::Value::Time(is_negative, days, hours, minutes, seconds, _micro) => {
            let sign = if is_negative { "-" } else { "" };
            Value::Text(format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                u32::from(hours) + days * 24,
                minutes,
                seconds
            ))
        }
    }
}
