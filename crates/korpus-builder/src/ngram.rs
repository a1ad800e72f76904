//! N-gram lookup table materialization
//!
//! Multi-token queries against a sequential token table need one
//! self-join per query token. The materializer pays that cost once: it
//! denormalizes the token table into overlapping fixed-width windows,
//! so an n-token lookup becomes a scan over a single table.

use itertools::Itertools;
use korpus_core::{
    ColumnSpec, CorpusStore, KorpusError, Result, SchemaRegistry, TableSchema, Value,
    create_table_sql, resolve_type, sql_literal,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Phases of one materialization run, entered in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NgramPhase {
    /// Reading the source extent, the sentinel value and the chunk size
    Sizing,
    /// Creating the derived table
    Creating,
    /// Inserting one chunk of full windows via self-joins
    Filling { chunk: u64 },
    /// Synthesizing the trailing rows whose windows run past the corpus
    Padding,
    /// Terminal
    Done,
}

/// Name of the n-gram lookup table derived from a token table
pub fn ngram_table_name(source: &str) -> String {
    format!("{}Ngram", source)
}

/// Derive the n-gram table schema from a token table.
///
/// Every column of the source except the key column appears once with
/// suffix `1`; the key column appears `width` times with suffixes
/// `1..=width`. Link columns are frozen to their resolved types, so the
/// derived table stands alone.
pub fn ngram_schema(
    source: &TableSchema,
    registry: &SchemaRegistry,
    key_column: &str,
    width: u32,
) -> Result<TableSchema> {
    if width < 2 {
        return Err(KorpusError::Configuration(format!(
            "n-gram width must be at least 2, got {}",
            width
        )));
    }
    if source.get_column(key_column).is_none() {
        return Err(KorpusError::SchemaMismatch(format!(
            "{}: unknown key column {}",
            source.name(),
            key_column
        )));
    }

    let mut table = TableSchema::new(ngram_table_name(source.name()));
    let mut key_columns = Vec::with_capacity(width as usize);
    for column in source.columns().iter().filter(|c| c.create) {
        let data_type = resolve_type(column, registry)?;
        if column.name == key_column {
            for i in 1..=width {
                key_columns.push(ColumnSpec::column(
                    format!("{}{}", column.name, i),
                    data_type.clone(),
                ));
            }
        } else if column.is_identifier {
            table.add_column(ColumnSpec::identifier(
                format!("{}1", column.name),
                data_type,
            ))?;
        } else {
            table.add_column(ColumnSpec::column(format!("{}1", column.name), data_type))?;
        }
    }
    for column in key_columns {
        table.add_column(column)?;
    }
    Ok(table)
}

/// Runs the `Sizing → Creating → Filling → Padding → Done` sequence for
/// one n-gram table. Construction borrows everything; `run` does the
/// store work.
pub(crate) struct NgramMaterializer<'a> {
    store: &'a dyn CorpusStore,
    registry: &'a SchemaRegistry,
    source: &'a TableSchema,
    key_column: &'a str,
    width: u32,
    join_budget: usize,
    na_literal: &'a str,
    stop: &'a AtomicBool,
}

impl<'a> NgramMaterializer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn CorpusStore,
        registry: &'a SchemaRegistry,
        source: &'a TableSchema,
        key_column: &'a str,
        width: u32,
        join_budget: usize,
        na_literal: &'a str,
        stop: &'a AtomicBool,
    ) -> Self {
        Self {
            store,
            registry,
            source,
            key_column,
            width,
            join_budget,
            na_literal,
            stop,
        }
    }

    /// Build and fill the n-gram table.
    ///
    /// Cancellation is honored between chunks, never mid-statement. On
    /// any error the table may be left partially filled; the caller is
    /// expected to drop it.
    pub async fn run(&self) -> Result<()> {
        let schema = ngram_schema(self.source, self.registry, self.key_column, self.width)?;
        let id_column = self
            .source
            .primary()
            .filter(|p| p.unique)
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                KorpusError::SchemaMismatch(format!(
                    "{}: n-gram materialization requires a unique identifier",
                    self.source.name()
                ))
            })?;

        self.enter(NgramPhase::Sizing);
        let max_id = self.max_source_id(&id_column).await?;
        let na_value = self.na_value().await?;
        let chunk_size = (self.join_budget / self.width as usize).max(1) as i64;
        tracing::info!(
            table = %schema.name(),
            max_id,
            chunk_size,
            na = %na_value,
            "sized n-gram materialization"
        );

        self.enter(NgramPhase::Creating);
        let sql = create_table_sql(&schema, self.registry, self.store.dialect())?;
        self.store.execute(&sql).await?;

        let columns: Vec<String> = schema.columns().iter().map(|c| c.name.clone()).collect();
        let mut current_id = 0i64;
        let mut chunk = 1u64;
        while current_id <= max_id {
            self.check_cancelled()?;
            self.enter(NgramPhase::Filling { chunk });
            let sql =
                self.fill_chunk_sql(&schema, &columns, &id_column, current_id, current_id + chunk_size);
            self.store.execute(&sql).await?;
            current_id += chunk_size;
            chunk += 1;
        }

        self.check_cancelled()?;
        self.enter(NgramPhase::Padding);
        self.pad_trailing_rows(&schema, &columns, &id_column, max_id, &na_value)
            .await?;

        self.enter(NgramPhase::Done);
        Ok(())
    }

    fn enter(&self, phase: NgramPhase) {
        tracing::info!(table = %self.source.name(), phase = ?phase, "n-gram phase");
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(KorpusError::Cancelled);
        }
        Ok(())
    }

    async fn max_source_id(&self, id_column: &str) -> Result<i64> {
        let sql = format!("SELECT MAX({}) FROM {}", id_column, self.source.name());
        let rows = self.store.query(&sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// The sentinel for key positions past the last token: one past the
    /// linked lexicon's highest id, or the configured literal when the
    /// key column is not a link.
    async fn na_value(&self) -> Result<Value> {
        let key = self.source.get_column(self.key_column).ok_or_else(|| {
            KorpusError::SchemaMismatch(format!(
                "{}: unknown key column {}",
                self.source.name(),
                self.key_column
            ))
        })?;
        match &key.link_target {
            Some(target) => {
                let primary = self
                    .registry
                    .get(target)
                    .and_then(TableSchema::primary)
                    .ok_or_else(|| {
                        KorpusError::UnresolvedLink(format!(
                            "column {} links to unknown table {}",
                            self.key_column, target
                        ))
                    })?;
                let sql = format!("SELECT MAX({}) FROM {}", primary.name, target);
                let rows = self.store.query(&sql).await?;
                let max = rows
                    .first()
                    .and_then(|row| row.get(0))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                Ok(Value::Int(max + 1))
            }
            None => Ok(Value::Text(self.na_literal.to_string())),
        }
    }

    /// One `INSERT … SELECT` over `width` aliased self-joins of the
    /// source table. Copy `k` renames its columns with suffix `k` and
    /// joins to copy 1 at offset `k − 1`; the inner joins drop windows
    /// that would run past the last token, which padding supplies later.
    fn fill_chunk_sql(
        &self,
        schema: &TableSchema,
        columns: &[String],
        id_column: &str,
        lower: i64,
        upper: i64,
    ) -> String {
        let mut joins = Vec::with_capacity(self.width as usize);
        for k in 1..=self.width {
            if k == 1 {
                let fields = self
                    .source
                    .columns()
                    .iter()
                    .filter(|c| c.create)
                    .map(|c| format!("{} AS {}1", c.name, c.name))
                    .join(", ");
                joins.push(format!(
                    "FROM (SELECT {} FROM {}) AS T1",
                    fields,
                    self.source.name()
                ));
            } else {
                let fields = [id_column, self.key_column]
                    .iter()
                    .map(|name| format!("{} AS {}{}", name, name, k))
                    .join(", ");
                joins.push(format!(
                    "INNER JOIN (SELECT {} FROM {}) AS T{} ON {}{} = {}1 + {}",
                    fields,
                    self.source.name(),
                    k,
                    id_column,
                    k,
                    id_column,
                    k - 1
                ));
            }
        }
        format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} {joins} \
             WHERE {id}1 >= {lower} AND {id}1 < {upper}",
            table = schema.name(),
            columns = columns.join(", "),
            joins = joins.join(" "),
            id = id_column,
        )
    }

    /// Synthesize rows for the trailing positions whose windows read past
    /// `max_id`. Each pad row carries its own token's suffix-1 columns;
    /// key suffixes beyond the corpus end hold the sentinel.
    async fn pad_trailing_rows(
        &self,
        schema: &TableSchema,
        columns: &[String],
        id_column: &str,
        max_id: i64,
        na_value: &Value,
    ) -> Result<()> {
        let span = self.width as i64 - 1;
        let source_columns = self
            .source
            .columns()
            .iter()
            .filter(|c| c.create)
            .map(|c| c.name.clone())
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} > {} ORDER BY {}",
            source_columns,
            self.source.name(),
            id_column,
            max_id - span,
            id_column
        );
        let trailing = self.store.query(&sql).await?;
        if trailing.is_empty() {
            return Ok(());
        }

        let dialect = self.store.dialect();
        let mut tuples = Vec::with_capacity(trailing.len());
        for (position, row) in trailing.iter().enumerate() {
            let mut rendered = Vec::with_capacity(columns.len());
            for column in self.source.columns().iter().filter(|c| c.create) {
                if column.name == self.key_column {
                    continue;
                }
                let value = row.get_by_name(&column.name).cloned().unwrap_or(Value::Null);
                rendered.push(sql_literal(&value, dialect));
            }
            for offset in 0..self.width as usize {
                let value = match trailing.get(position + offset) {
                    Some(later) => later
                        .get_by_name(self.key_column)
                        .cloned()
                        .unwrap_or(Value::Null),
                    None => na_value.clone(),
                };
                rendered.push(sql_literal(&value, dialect));
            }
            tuples.push(format!("({})", rendered.join(", ")));
        }

        let insert = format!(
            "INSERT INTO {} ({}) VALUES {}",
            schema.name(),
            columns.join(", "),
            tuples.join(", ")
        );
        self.store.execute(&insert).await?;
        Ok(())
    }
}
