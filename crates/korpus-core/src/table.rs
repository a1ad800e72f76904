//! Table schemas with an in-memory insertion cache and dedup index

use crate::{ColumnSpec, CorpusStore, KorpusError, Result, SqlDialect, Value, ValueKey, sql_literal};
use std::collections::HashMap;
use unicode_normalization::{UnicodeNormalization, is_nfkc};

/// Registry of declared tables, keyed by name in declaration order
pub type SchemaRegistry = indexmap::IndexMap<String, TableSchema>;

/// An ordered collection of column descriptions for one logical table,
/// together with the process-local insertion state.
///
/// Rows passed to [`add`](TableSchema::add) and friends are named-value
/// slices covering every non-identifier column; they are validated
/// against the declared columns before anything is buffered. Every id
/// ever handed out stays in the dedup index for the lifetime of the
/// schema, while the pending buffer only holds rows not yet flushed.
#[derive(Debug)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSpec>,
    primary: Option<usize>,
    row_order: Vec<String>,
    pending: Vec<Vec<Value>>,
    dedup: HashMap<Vec<ValueKey>, i64>,
    current_id: i64,
    line_counter: i64,
    flush_threshold: Option<usize>,
    case_insensitive: bool,
}

impl TableSchema {
    /// Create an empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary: None,
            row_order: Vec::new(),
            pending: Vec::new(),
            dedup: HashMap::new(),
            current_id: 0,
            line_counter: 1,
            flush_threshold: None,
            case_insensitive: false,
        }
    }

    /// Create a schema from a column list
    pub fn with_columns(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut schema = Self::new(name);
        for column in columns {
            schema.add_column(column)?;
        }
        Ok(schema)
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All declared columns, in declaration order
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// The identifier column, if one was declared
    pub fn primary(&self) -> Option<&ColumnSpec> {
        self.primary.map(|idx| &self.columns[idx])
    }

    /// Look up a column by name
    pub fn get_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The non-identifier column names in declaration order (for tables
    /// with a non-unique identifier, the identifier is part of this list)
    pub fn column_order(&self) -> &[String] {
        &self.row_order
    }

    /// The highest id handed out so far
    pub fn last_id(&self) -> i64 {
        self.current_id
    }

    /// Number of buffered rows not yet flushed
    pub fn pending_rows(&self) -> usize {
        self.pending.len()
    }

    /// Set the number of buffered rows above which the builder flushes
    /// this table as a side effect of adding. `None` disables the
    /// threshold; the table is then flushed only by explicit commits.
    pub fn set_flush_threshold(&mut self, threshold: Option<usize>) {
        self.flush_threshold = threshold;
    }

    /// Whether the pending buffer has outgrown the flush threshold
    pub fn needs_flush(&self) -> bool {
        self.flush_threshold
            .is_some_and(|max| self.pending.len() > max)
    }

    /// Fold text case when building dedup keys, so that in-memory lookups
    /// agree with a case-insensitive store collation
    pub fn set_case_insensitive(&mut self, case_insensitive: bool) {
        self.case_insensitive = case_insensitive;
    }

    /// Register a column.
    ///
    /// A link column whose name is already declared is dropped silently:
    /// it aliases the existing column for a second target table. Any
    /// other duplicate name is an error.
    pub fn add_column(&mut self, column: ColumnSpec) -> Result<()> {
        let already_declared = self.row_order.iter().any(|n| n == &column.name)
            || self.primary().is_some_and(|p| p.name == column.name);
        if already_declared {
            if column.is_link() {
                return Ok(());
            }
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: duplicate column {}",
                self.name, column.name
            )));
        }

        if column.is_identifier {
            if !column.unique {
                self.row_order.push(column.name.clone());
            }
            self.primary = Some(self.columns.len());
        } else {
            self.row_order.push(column.name.clone());
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace the declared type of a column
    pub fn set_column_type(&mut self, name: &str, data_type: impl Into<String>) -> Result<()> {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => {
                column.data_type = data_type.into();
                Ok(())
            }
            None => Err(KorpusError::SchemaMismatch(format!(
                "{}: unknown column {}",
                self.name, name
            ))),
        }
    }

    /// Buffer a new row and return its assigned id.
    ///
    /// `values` must name every non-identifier column exactly once. For
    /// tables with a unique identifier the id is assigned here; tables
    /// with a non-unique identifier expect it among the values.
    pub fn add(&mut self, values: &[(&str, Value)]) -> Result<i64> {
        let row = self.collect_row(&self.row_order, values)?;
        let key = self.row_key(&row);
        self.push_new(row, key)
    }

    /// Buffer a new row without recording it in the dedup index.
    ///
    /// Meant for sequential token tables, where rows never repeat and a
    /// dedup entry per token would grow the index to corpus size. Rows
    /// buffered this way are flushed by [`commit`](TableSchema::commit)
    /// like any other.
    pub fn append(&mut self, values: &[(&str, Value)]) -> Result<i64> {
        let row = self.collect_row(&self.row_order, values)?;
        if !self.primary_spec()?.unique {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: append requires a unique identifier",
                self.name
            )));
        }
        self.current_id += 1;
        let mut full = Vec::with_capacity(row.len() + 1);
        full.push(Value::Int(self.current_id));
        full.extend(row);
        self.pending.push(full);
        Ok(self.current_id)
    }

    /// Buffer a row whose identifier value is supplied by the caller.
    ///
    /// The internal id counter moves to the supplied id, so later calls
    /// to [`add`](TableSchema::add) continue from it.
    pub fn add_with_id(&mut self, values: &[(&str, Value)]) -> Result<i64> {
        let primary = self.primary_spec()?;
        if !primary.unique {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: add_with_id requires a unique identifier",
                self.name
            )));
        }
        let mut names = Vec::with_capacity(self.row_order.len() + 1);
        names.push(primary.name.clone());
        names.extend(self.row_order.iter().cloned());

        let row = self.collect_row(&names, values)?;
        let id = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                KorpusError::SchemaMismatch(format!(
                    "{}: identifier must be an integer",
                    self.name
                ))
            })?;
        let key = self.row_key(&row);
        self.current_id = id;
        self.pending.push(row);
        self.dedup.insert(key, id);
        Ok(id)
    }

    /// Return the id of the row with these values, buffering a new row
    /// only if no value-equal row was seen before. Hits are O(1) and
    /// never touch the store.
    pub fn get_or_insert(&mut self, values: &[(&str, Value)]) -> Result<i64> {
        let row = self.collect_row(&self.row_order, values)?;
        let key = self.row_key(&row);
        if let Some(&id) = self.dedup.get(&key) {
            return Ok(id);
        }
        self.push_new(row, key)
    }

    /// The column names of buffered rows, id first for tables that
    /// assign their own ids
    pub fn field_order(&self) -> Vec<String> {
        match self.primary() {
            Some(p) if p.unique => {
                let mut order = Vec::with_capacity(self.row_order.len() + 1);
                order.push(p.name.clone());
                order.extend(self.row_order.iter().cloned());
                order
            }
            _ => self.row_order.clone(),
        }
    }

    /// Flush all pending rows to the store.
    ///
    /// Text values are NFKC-normalized on the way out. Tables with a
    /// non-unique identifier get explicit surrogate key values on
    /// SQLite, where the surrogate column carries no auto-increment.
    /// The dedup index survives the flush.
    pub async fn commit(&mut self, store: &dyn CorpusStore) -> Result<u64> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        for row in &mut self.pending {
            for value in row.iter_mut() {
                if let Value::Text(s) = value {
                    if !is_nfkc(s) {
                        *value = Value::Text(s.nfkc().collect());
                    }
                }
            }
        }

        let mut columns = self.field_order();
        let surrogate = self
            .primary()
            .filter(|p| !p.unique)
            .map(|p| p.alias());
        if let Some(surrogate_name) = surrogate {
            if store.dialect() == SqlDialect::Sqlite {
                columns.push(surrogate_name);
                for row in &mut self.pending {
                    row.push(Value::Int(self.line_counter));
                    self.line_counter += 1;
                }
            } else {
                // MySQL assigns the surrogate via AUTO_INCREMENT; keep
                // the counter in step so both backends number alike.
                self.line_counter += self.pending.len() as i64;
            }
        }

        let written = store.bulk_insert(&self.name, &columns, &self.pending).await?;
        self.pending.clear();
        tracing::debug!(table = %self.name, rows = written, "flushed pending rows");
        Ok(written)
    }

    /// Look up a committed row by column values and return its id
    pub async fn find(
        &self,
        store: &dyn CorpusStore,
        values: &[(&str, Value)],
    ) -> Result<Option<i64>> {
        let primary = self.primary_spec()?;
        if values.is_empty() {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: find requires at least one column",
                self.name
            )));
        }
        let dialect = store.dialect();
        let mut conditions = Vec::with_capacity(values.len());
        for (name, value) in values {
            if self.get_column(name).is_none() {
                return Err(KorpusError::SchemaMismatch(format!(
                    "{}: unknown column {}",
                    self.name, name
                )));
            }
            conditions.push(format!("{} = {}", name, sql_literal(value, dialect)));
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            primary.name,
            self.name,
            conditions.join(" AND ")
        );
        let rows = store.query(&sql).await?;
        Ok(rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64))
    }

    fn primary_spec(&self) -> Result<&ColumnSpec> {
        self.primary
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| {
                KorpusError::SchemaMismatch(format!(
                    "table {} has no identifier column",
                    self.name
                ))
            })
    }

    fn row_key(&self, row: &[Value]) -> Vec<ValueKey> {
        row.iter()
            .map(|value| match value {
                Value::Text(s) if self.case_insensitive => ValueKey::Text(s.to_lowercase()),
                _ => value.key(),
            })
            .collect()
    }

    fn collect_row(&self, names: &[String], values: &[(&str, Value)]) -> Result<Vec<Value>> {
        let mut row = Vec::with_capacity(names.len());
        for name in names {
            match values.iter().find(|(n, _)| n == name) {
                Some((_, value)) => row.push(value.clone()),
                None => {
                    return Err(KorpusError::SchemaMismatch(format!(
                        "{}: missing value for column {}",
                        self.name, name
                    )));
                }
            }
        }
        for (name, _) in values {
            if !names.iter().any(|n| n == name) {
                return Err(KorpusError::SchemaMismatch(format!(
                    "{}: unexpected column {}",
                    self.name, name
                )));
            }
        }
        if values.len() != names.len() {
            return Err(KorpusError::SchemaMismatch(format!(
                "{}: duplicate column in row",
                self.name
            )));
        }
        Ok(row)
    }

    fn push_new(&mut self, row: Vec<Value>, key: Vec<ValueKey>) -> Result<i64> {
        if self.primary_spec()?.unique {
            self.current_id += 1;
            let mut full = Vec::with_capacity(row.len() + 1);
            full.push(Value::Int(self.current_id));
            full.extend(row);
            self.pending.push(full);
        } else {
            let name = self.primary_spec()?.name.clone();
            let pos = self
                .row_order
                .iter()
                .position(|n| n == &name)
                .ok_or_else(|| {
                    KorpusError::SchemaMismatch(format!(
                        "{}: identifier {} not among row columns",
                        self.name, name
                    ))
                })?;
            self.current_id = row.get(pos).and_then(Value::as_i64).ok_or_else(|| {
                KorpusError::SchemaMismatch(format!(
                    "{}: identifier {} must be an integer",
                    self.name, name
                ))
            })?;
            self.pending.push(row);
        }
        self.dedup.insert(key, self.current_id);
        Ok(self.current_id)
    }
}
