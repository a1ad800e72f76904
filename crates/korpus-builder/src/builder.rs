//! The build orchestrator

use crate::ngram::{NgramMaterializer, ngram_table_name};
use crate::options::BuilderOptions;
use korpus_core::{
    CorpusStore, KorpusError, Result, SchemaRegistry, SqlDialect, TableSchema, Value,
    create_table_sql, resolve_type, suggest_type,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The sequential token table and the column its n-gram windows slide over
struct TokenTable {
    table: String,
    key_column: String,
}

/// Sequences one corpus build: declare schemas, buffer and flush source
/// records, then tighten column types, materialize the n-gram lookup
/// table and create indices.
///
/// All ingestion is sequential; the builder owns the only handle on the
/// store for the duration of the run. Cancellation is cooperative,
/// checked at flush and chunk boundaries via
/// [`request_stop`](CorpusBuilder::request_stop); cleanup of partial
/// artifacts happens here, not in the materializer.
pub struct CorpusBuilder {
    store: Arc<dyn CorpusStore>,
    options: BuilderOptions,
    tables: SchemaRegistry,
    token: Option<TokenTable>,
    stop: Arc<AtomicBool>,
}

impl CorpusBuilder {
    pub fn new(store: Arc<dyn CorpusStore>, options: BuilderOptions) -> Self {
        Self {
            store,
            options,
            tables: SchemaRegistry::new(),
            token: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The store this builder writes to
    pub fn store(&self) -> &dyn CorpusStore {
        self.store.as_ref()
    }

    /// The declared schemas, in declaration order
    pub fn tables(&self) -> &SchemaRegistry {
        &self.tables
    }

    /// Register a table for this run. Declaration order is creation
    /// order, which matters for links.
    pub fn declare_table(&mut self, mut schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(schema.name()) {
            return Err(KorpusError::SchemaMismatch(format!(
                "table {} is already declared",
                schema.name()
            )));
        }
        schema.set_flush_threshold(Some(self.options.flush_threshold));
        schema.set_case_insensitive(self.options.case_insensitive);
        self.tables.insert(schema.name().to_string(), schema);
        Ok(())
    }

    /// Register the sequential token table and the column the n-gram
    /// window slides over. Tokens go through the fast path
    /// ([`add_token`](CorpusBuilder::add_token)), which skips the dedup
    /// index.
    pub fn declare_token_table(&mut self, schema: TableSchema, key_column: &str) -> Result<()> {
        if schema.get_column(key_column).is_none() {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: unknown key column {}",
                schema.name(),
                key_column
            )));
        }
        if schema.primary().is_none_or(|p| !p.unique) {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: a token table needs a unique identifier",
                schema.name()
            )));
        }
        let table = schema.name().to_string();
        self.declare_table(schema)?;
        self.token = Some(TokenTable {
            table,
            key_column: key_column.to_string(),
        });
        Ok(())
    }

    /// Look up a declared table
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables.get(name).ok_or_else(|| {
            KorpusError::SchemaMismatch(format!("table {} is not declared", name))
        })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableSchema> {
        self.tables.get_mut(name).ok_or_else(|| {
            KorpusError::SchemaMismatch(format!("table {} is not declared", name))
        })
    }

    /// Buffer a new row, flushing the table first if its buffer has
    /// outgrown the flush threshold
    pub async fn add(&mut self, table: &str, values: &[(&str, Value)]) -> Result<i64> {
        self.flush_if_needed(table).await?;
        self.table_mut(table)?.add(values)
    }

    /// Buffer a row whose identifier the caller supplies
    pub async fn add_with_id(&mut self, table: &str, values: &[(&str, Value)]) -> Result<i64> {
        self.flush_if_needed(table).await?;
        self.table_mut(table)?.add_with_id(values)
    }

    /// Return the id of a value-equal buffered or committed row, adding
    /// a new row only on a miss
    pub async fn get_or_insert(&mut self, table: &str, values: &[(&str, Value)]) -> Result<i64> {
        self.flush_if_needed(table).await?;
        self.table_mut(table)?.get_or_insert(values)
    }

    /// Fast path for the token table: buffer a row without a dedup entry
    pub async fn add_token(&mut self, values: &[(&str, Value)]) -> Result<i64> {
        let table = self.token_table()?.to_string();
        self.flush_if_needed(&table).await?;
        self.table_mut(&table)?.append(values)
    }

    /// Flush one table's pending rows to the store
    pub async fn commit(&mut self, table: &str) -> Result<u64> {
        let store = Arc::clone(&self.store);
        self.table_mut(table)?.commit(store.as_ref()).await
    }

    /// Flush every declared table in declaration order. Called at
    /// end-of-file by ingestion loops.
    pub async fn commit_all(&mut self) -> Result<u64> {
        let store = Arc::clone(&self.store);
        let mut written = 0;
        for schema in self.tables.values_mut() {
            written += schema.commit(store.as_ref()).await?;
        }
        Ok(written)
    }

    /// Create every declared table.
    ///
    /// All links are resolved up front, so an unresolved link fails the
    /// run before any DDL has executed.
    pub async fn create_all_tables(&self) -> Result<()> {
        for schema in self.tables.values() {
            for column in schema.columns() {
                resolve_type(column, &self.tables)?;
            }
        }
        for schema in self.tables.values() {
            let sql = create_table_sql(schema, &self.tables, self.store.dialect())?;
            tracing::info!(table = %schema.name(), "creating table");
            self.store.execute(&sql).await?;
        }
        Ok(())
    }

    /// Shrink column types to the smallest that fit the loaded data.
    ///
    /// Only MySQL can retype a populated column; on SQLite the stage is
    /// skipped. A failure on one column is logged and skipped so it does
    /// not block the rest of the schema.
    pub async fn optimize_column_types(&mut self) -> Result<()> {
        if self.store.dialect() == SqlDialect::Sqlite {
            tracing::info!("SQLite cannot retype columns, skipping type optimization");
            return Ok(());
        }

        let mut changes: Vec<(String, String, String)> = Vec::new();
        for schema in self.tables.values() {
            self.check_cancelled()?;
            for column in schema.columns().iter().filter(|c| c.create) {
                // links get the optimal type of the column they point to
                let suggested = match &column.link_target {
                    Some(target) => {
                        let Some((linked, primary)) = self
                            .tables
                            .get(target)
                            .and_then(|t| t.primary().map(|p| (t, p.name.clone())))
                        else {
                            continue;
                        };
                        suggest_type(self.store.as_ref(), linked, &primary).await
                    }
                    None => suggest_type(self.store.as_ref(), schema, &column.name).await,
                };
                match suggested {
                    Ok(suggested) => {
                        if !column.data_type.trim().eq_ignore_ascii_case(suggested.trim()) {
                            changes.push((
                                schema.name().to_string(),
                                column.name.clone(),
                                suggested,
                            ));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            table = %schema.name(),
                            column = %column.name,
                            error = %e,
                            "skipping column optimization"
                        );
                    }
                }
            }
        }

        for (table, column, data_type) in changes {
            let sql = format!("ALTER TABLE {} MODIFY {} {}", table, column, data_type);
            match self.store.execute(&sql).await {
                Ok(_) => {
                    tracing::info!(table = %table, column = %column, new_type = %data_type,
                        "optimized column type");
                    self.table_mut(&table)?.set_column_type(&column, &data_type)?;
                }
                Err(e) => {
                    tracing::warn!(table = %table, column = %column, error = %e,
                        "failed to apply optimized type");
                }
            }
        }
        Ok(())
    }

    /// Index every data column of every declared table.
    ///
    /// Identifier columns are already keyed; BLOB columns are never
    /// queried and are skipped. A failure on one index is logged and
    /// skipped.
    pub async fn create_indices(&self) -> Result<()> {
        for schema in self.tables.values() {
            for column in schema
                .columns()
                .iter()
                .filter(|c| c.create && !c.is_identifier)
            {
                self.check_cancelled()?;
                if column.base_type().ends_with("BLOB") {
                    continue;
                }
                // TEXT keys need a prefix length on MySQL
                let length_hint = if column.base_type().ends_with("TEXT") {
                    column.index_length
                } else {
                    None
                };
                let index_name = format!("{}_{}", schema.name(), column.name);
                if let Err(e) = self
                    .store
                    .create_index(schema.name(), &index_name, &[column.name.clone()], length_hint)
                    .await
                {
                    tracing::warn!(
                        table = %schema.name(),
                        column = %column.name,
                        error = %e,
                        "skipping index"
                    );
                }
            }
        }
        Ok(())
    }

    /// Materialize the n-gram lookup table over the declared token table.
    ///
    /// A partially filled lookup table silently loses matches, so on any
    /// error, including cancellation, the table is dropped before the
    /// error propagates.
    pub async fn build_ngram_lookup(&self, width: u32) -> Result<()> {
        let token = self.token.as_ref().ok_or_else(|| {
            KorpusError::Configuration("no token table declared for n-gram lookup".into())
        })?;
        let source = self.table(&token.table)?;

        let outcome = NgramMaterializer::new(
            self.store.as_ref(),
            &self.tables,
            source,
            &token.key_column,
            width,
            self.options.join_budget,
            &self.options.na_literal,
            &self.stop,
        )
        .run()
        .await;

        if let Err(e) = outcome {
            let name = ngram_table_name(&token.table);
            tracing::warn!(table = %name, error = %e, "dropping partially built n-gram table");
            if let Err(drop_err) = self.store.drop_table(&name).await {
                tracing::warn!(table = %name, error = %drop_err, "cleanup failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Look a committed row up in the store by column values
    pub async fn find(&self, table: &str, values: &[(&str, Value)]) -> Result<Option<i64>> {
        self.table(table)?.find(self.store.as_ref(), values).await
    }

    /// Request a cooperative stop. Takes effect at the next flush, file
    /// or chunk boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Shared stop flag, for wiring up signal handlers
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Fail with [`KorpusError::Cancelled`] if a stop was requested.
    /// Ingestion loops call this between files.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(KorpusError::Cancelled);
        }
        Ok(())
    }

    fn token_table(&self) -> Result<&str> {
        self.token
            .as_ref()
            .map(|t| t.table.as_str())
            .ok_or_else(|| KorpusError::Configuration("no token table declared".into()))
    }

    async fn flush_if_needed(&mut self, table: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let schema = self.table_mut(table)?;
        if schema.needs_flush() {
            tracing::debug!(table = %table, rows = schema.pending_rows(), "flush threshold reached");
            schema.commit(store.as_ref()).await?;
        }
        Ok(())
    }
}
