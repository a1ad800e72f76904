//! Storage-minimal column types derived from observed data

use crate::{CorpusStore, KorpusError, Result, SqlDialect, TableSchema, Value};

const INT_LADDER: [(i64, i64, &str); 8] = [
    (0, 255, "TINYINT UNSIGNED"),
    (-128, 127, "TINYINT"),
    (0, 65535, "SMALLINT UNSIGNED"),
    (-32768, 32767, "SMALLINT"),
    (0, 16777215, "MEDIUMINT UNSIGNED"),
    (-8388608, 8388607, "MEDIUMINT"),
    (0, 4294967295, "INT UNSIGNED"),
    (-2147483648, 2147483647, "INT"),
];

/// Return the smallest safe SQL type for a column, based on the values
/// the store currently holds.
///
/// Integer columns shrink to the narrowest type covering their range,
/// text columns become `VARCHAR(longest + 1)`, fixed-point columns
/// degrade to floating point. An empty table keeps its declared type.
/// `NOT NULL` is appended when no NULL was observed. The suggestion is
/// not applied here; whether it can be applied at all depends on the
/// backend.
pub async fn suggest_type(
    store: &dyn CorpusStore,
    schema: &TableSchema,
    column_name: &str,
) -> Result<String> {
    let column = schema.get_column(column_name).ok_or_else(|| {
        KorpusError::SchemaMismatch(format!(
            "{}: unknown column {}",
            schema.name(),
            column_name
        ))
    })?;

    let sql = format!(
        "SELECT MAX({} IS NULL) FROM {}",
        column.name,
        schema.name()
    );
    let rows = store.query(&sql).await?;
    let has_null = match rows.first().and_then(|r| r.get(0)) {
        // an empty table keeps its declared type
        None | Some(Value::Null) => return Ok(column.data_type.clone()),
        Some(value) => value.as_i64().unwrap_or(0) != 0,
    };

    let base = column.base_type();
    let mut suggestion = if base.ends_with("INT") {
        let sql = format!(
            "SELECT MIN({col}), MAX({col}) FROM {table} WHERE {col} IS NOT NULL",
            col = column.name,
            table = schema.name()
        );
        let rows = store.query(&sql).await?;
        let bounds = rows.first().and_then(|r| {
            match (
                r.get(0).and_then(Value::as_i64),
                r.get(1).and_then(Value::as_i64),
            ) {
                (Some(lo), Some(hi)) => Some((lo, hi)),
                _ => None,
            }
        });
        match bounds {
            Some((lo, hi)) => integer_type(lo, hi).to_string(),
            None => column.data_type.clone(),
        }
    } else if base.ends_with("CHAR") || base.ends_with("TEXT") {
        let sql = format!(
            "SELECT MAX({len}(RTRIM({col}))) FROM {table}",
            len = store.dialect().length_function(),
            col = column.name,
            table = schema.name()
        );
        let rows = store.query(&sql).await?;
        match rows.first().and_then(|r| r.get(0)).and_then(Value::as_i64) {
            Some(max_len) => format!("VARCHAR({})", max_len + 1),
            None => column.data_type.clone(),
        }
    } else if matches!(base.as_str(), "DECIMAL" | "NUMERIC") {
        match store.dialect() {
            SqlDialect::Sqlite => "REAL".to_string(),
            SqlDialect::MySql => column.data_type.replace(&base, "FLOAT"),
        }
    } else if matches!(base.as_str(), "FLOAT" | "DOUBLE" | "REAL") {
        match store.dialect() {
            SqlDialect::Sqlite => "REAL".to_string(),
            SqlDialect::MySql => column.data_type.clone(),
        }
    } else {
        column.data_type.clone()
    };

    if !has_null && !suggestion.contains("NOT NULL") {
        suggestion.push_str(" NOT NULL");
    }
    Ok(suggestion)
}

/// Smallest integer type covering the observed range
fn integer_type(min: i64, max: i64) -> &'static str {
    for (lo, hi, label) in INT_LADDER {
        if min >= lo && max <= hi {
            return label;
        }
    }
    if min >= 0 { "BIGINT UNSIGNED" } else { "BIGINT" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store::RecordingStore;
    use crate::ColumnSpec;

    fn stats_table() -> TableSchema {
        TableSchema::with_columns(
            "Tokens",
            vec![
                ColumnSpec::identifier("ID", "INT UNSIGNED NOT NULL"),
                ColumnSpec::column("Frequency", "INT UNSIGNED NOT NULL"),
                ColumnSpec::column("Word", "VARCHAR(1024) NOT NULL"),
                ColumnSpec::column("Weight", "DECIMAL(10,2)"),
                ColumnSpec::column("Score", "DOUBLE"),
                ColumnSpec::column("Added", "DATE"),
            ],
        )
        .expect("valid schema")
    }

    #[tokio::test]
    async fn small_unsigned_range_shrinks_to_tinyint() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond("MIN(", RecordingStore::pair(Value::Int(0), Value::Int(200)));
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "TINYINT UNSIGNED NOT NULL");
    }

    #[tokio::test]
    async fn signed_range_shrinks_to_signed_type() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond("MIN(", RecordingStore::pair(Value::Int(-100), Value::Int(100)));
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "TINYINT NOT NULL");
    }

    #[tokio::test]
    async fn nullable_columns_keep_null_allowed() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(1)))
            .respond("MIN(", RecordingStore::pair(Value::Int(0), Value::Int(300)));
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "SMALLINT UNSIGNED");
    }

    #[tokio::test]
    async fn wide_ranges_fall_back_to_bigint() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond(
                "MIN(",
                RecordingStore::pair(Value::Int(0), Value::Int(5_000_000_000)),
            );
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "BIGINT UNSIGNED NOT NULL");

        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond(
                "MIN(",
                RecordingStore::pair(Value::Int(-5_000_000_000), Value::Int(0)),
            );
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "BIGINT NOT NULL");
    }

    #[tokio::test]
    async fn text_columns_shrink_to_observed_length_plus_one() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond("RTRIM", RecordingStore::single(Value::Int(12)));
        let suggestion = suggest_type(&store, &stats_table(), "Word")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "VARCHAR(13) NOT NULL");

        let queries = store.queries.lock().expect("lock");
        assert!(queries.iter().any(|q| q.contains("length(RTRIM(Word))")));
    }

    #[tokio::test]
    async fn mysql_uses_char_length_for_text() {
        let store = RecordingStore::new(SqlDialect::MySql)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)))
            .respond("RTRIM", RecordingStore::single(Value::Int(7)));
        let suggestion = suggest_type(&store, &stats_table(), "Word")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "VARCHAR(8) NOT NULL");

        let queries = store.queries.lock().expect("lock");
        assert!(queries.iter().any(|q| q.contains("CHAR_LENGTH(RTRIM(Word))")));
    }

    #[tokio::test]
    async fn empty_tables_keep_the_declared_type() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Null));
        let suggestion = suggest_type(&store, &stats_table(), "Frequency")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "INT UNSIGNED NOT NULL");
    }

    #[tokio::test]
    async fn fixed_point_degrades_per_dialect() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)));
        let suggestion = suggest_type(&store, &stats_table(), "Weight")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "REAL NOT NULL");

        let store = RecordingStore::new(SqlDialect::MySql)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)));
        let suggestion = suggest_type(&store, &stats_table(), "Weight")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "FLOAT(10,2) NOT NULL");
    }

    #[tokio::test]
    async fn floating_types_only_change_on_sqlite() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(1)));
        let suggestion = suggest_type(&store, &stats_table(), "Score")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "REAL");

        let store = RecordingStore::new(SqlDialect::MySql)
            .respond("IS NULL", RecordingStore::single(Value::Int(1)));
        let suggestion = suggest_type(&store, &stats_table(), "Score")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "DOUBLE");
    }

    #[tokio::test]
    async fn other_types_pass_through() {
        let store = RecordingStore::new(SqlDialect::Sqlite)
            .respond("IS NULL", RecordingStore::single(Value::Int(0)));
        let suggestion = suggest_type(&store, &stats_table(), "Added")
            .await
            .expect("suggestion");
        assert_eq!(suggestion, "DATE NOT NULL");
    }
}
