//! DDL generation for the supported SQL dialects
//!
//! The two backends diverge in surrogate-key handling, auto-increment
//! placement, ENUM support, identifier quoting, case sensitivity and
//! unsigned integers; everything dialect-specific lives here.

use crate::{ColumnSpec, KorpusError, Result, SchemaRegistry, SqlDialect, TableSchema};

/// Generate the full CREATE TABLE statement for a schema
pub fn create_table_sql(
    schema: &TableSchema,
    registry: &SchemaRegistry,
    dialect: SqlDialect,
) -> Result<String> {
    Ok(format!(
        "CREATE TABLE {} ({})",
        schema.name(),
        column_clauses(schema, registry, dialect)?
    ))
}

/// Generate the column-definition clause list for a schema.
///
/// Link columns are resolved against `registry`; an unknown target
/// fails with [`KorpusError::UnresolvedLink`]. Columns flagged as
/// declared-only are skipped.
pub fn column_clauses(
    schema: &TableSchema,
    registry: &SchemaRegistry,
    dialect: SqlDialect,
) -> Result<String> {
    match dialect {
        SqlDialect::MySql => mysql_clauses(schema, registry),
        SqlDialect::Sqlite => sqlite_clauses(schema, registry),
    }
}

/// The effective SQL type of a column: links take the identifier type
/// of their target table
pub fn resolve_type(column: &ColumnSpec, registry: &SchemaRegistry) -> Result<String> {
    match &column.link_target {
        Some(target) => {
            let linked = registry.get(target).ok_or_else(|| {
                KorpusError::UnresolvedLink(format!(
                    "column {} links to unknown table {}",
                    column.name, target
                ))
            })?;
            let primary = linked.primary().ok_or_else(|| {
                KorpusError::UnresolvedLink(format!(
                    "linked table {} has no identifier column",
                    target
                ))
            })?;
            Ok(primary.data_type.clone())
        }
        None => Ok(column.data_type.clone()),
    }
}

fn mysql_clauses(schema: &TableSchema, registry: &SchemaRegistry) -> Result<String> {
    let mut defs: Vec<String> = Vec::new();
    for column in schema.columns() {
        if !column.create {
            continue;
        }
        let dtype = resolve_type(column, registry)?;
        if !column.is_identifier {
            defs.push(format!("`{}` {}", column.name, dtype));
        } else if !column.unique {
            // the declared identifier repeats across rows; a surrogate
            // key column takes over as the actual primary key
            defs.insert(
                0,
                format!("`{}_primary` INT NOT NULL AUTO_INCREMENT", column.name),
            );
            defs.insert(1, format!("`{}` {}", column.name, dtype));
        } else {
            // no AUTO_INCREMENT on textual or enumerated identifiers
            let upper = column.data_type.to_uppercase();
            if upper.starts_with("ENUM") || upper.starts_with("VARCHAR") || upper.starts_with("TEXT")
            {
                defs.push(format!("`{}` {}", column.name, dtype));
            } else {
                defs.push(format!("`{}` {} AUTO_INCREMENT", column.name, dtype));
            }
        }
    }

    let primary = schema.primary().ok_or_else(|| {
        KorpusError::SchemaMismatch(format!(
            "table {} has no identifier column",
            schema.name()
        ))
    })?;
    defs.push(format!("PRIMARY KEY (`{}`)", primary.alias()));

    Ok(defs.join(",\n\t"))
}

fn sqlite_clauses(schema: &TableSchema, registry: &SchemaRegistry) -> Result<String> {
    if schema.primary().is_none() {
        return Err(KorpusError::SchemaMismatch(format!(
            "table {} has no identifier column",
            schema.name()
        )));
    }

    let mut defs: Vec<String> = Vec::new();
    for column in schema.columns() {
        if !column.create {
            continue;
        }
        // SQLite has no ENUM type; such columns become VARCHAR sized
        // to the longest enumerated literal
        let resolved = resolve_type(column, registry)?;
        let dtype = enum_to_varchar(&resolved).unwrap_or(resolved);

        if !column.is_identifier {
            defs.push(format!("{} {}", column.name, dtype));
        } else if !column.unique {
            defs.insert(
                0,
                format!("{}_primary INT NOT NULL PRIMARY KEY", column.name),
            );
            defs.insert(1, format!("{} {}", column.name, dtype));
        } else {
            defs.push(format!("{} {} PRIMARY KEY", column.name, dtype));
        }
    }

    // SQLite compares text case-sensitively by default; NOCASE matches
    // the MySQL default collation
    for def in defs.iter_mut() {
        let field_type = def
            .split_whitespace()
            .nth(1)
            .unwrap_or("")
            .to_uppercase();
        if field_type.contains("VARCHAR") || field_type.contains("TEXT") {
            def.push_str(" COLLATE NOCASE");
        }
    }

    Ok(defs.join(",\n\t").replace(" UNSIGNED", ""))
}

/// Convert an ENUM type string to a VARCHAR wide enough for its longest
/// literal, keeping trailing qualifiers. Returns `None` for non-ENUM
/// types.
fn enum_to_varchar(data_type: &str) -> Option<String> {
    let trimmed = data_type.trim_start();
    if !trimmed.to_uppercase().starts_with("ENUM(") {
        return None;
    }
    let open = trimmed.find('(')?;
    let close = trimmed.rfind(')')?;
    if close <= open {
        return None;
    }

    // literals are single-quoted with '' as the escaped quote; commas
    // separate literals only outside the quotes
    let mut max_len = 0usize;
    let mut current = 0usize;
    let mut in_literal = false;
    let mut chars = trimmed[open + 1..close].chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_literal => in_literal = true,
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                current += 1;
            }
            '\'' => {
                in_literal = false;
                max_len = max_len.max(current);
                current = 0;
            }
            _ if in_literal => current += 1,
            _ => {}
        }
    }
    Some(format!("VARCHAR({}){}", max_len, &trimmed[close + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn registry_with_link_target() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        let misc = TableSchema::with_columns(
            "Misc",
            vec![ColumnSpec::identifier("MiscId", "MEDIUMINT")],
        )
        .expect("valid schema");
        registry.insert("Misc".into(), misc);
        registry
    }

    fn sample_table() -> TableSchema {
        TableSchema::with_columns(
            "Sample",
            vec![
                ColumnSpec::identifier("ID", "INT UNSIGNED NOT NULL"),
                ColumnSpec::column("Label", "VARCHAR(30)"),
                ColumnSpec::column("Value", "INT UNSIGNED NOT NULL"),
                ColumnSpec::column("Category", "ENUM('val1','val2','val3') NOT NULL"),
                ColumnSpec::link("LinkId", "Misc"),
            ],
        )
        .expect("valid schema")
    }

    #[test]
    fn sqlite_clauses_for_unique_identifier() {
        let clauses =
            column_clauses(&sample_table(), &registry_with_link_target(), SqlDialect::Sqlite)
                .expect("clauses");
        assert_eq!(
            flat(&clauses),
            "ID INT NOT NULL PRIMARY KEY, \
             Label VARCHAR(30) COLLATE NOCASE, \
             Value INT NOT NULL, \
             Category VARCHAR(4) NOT NULL COLLATE NOCASE, \
             LinkId MEDIUMINT"
        );
    }

    #[test]
    fn mysql_clauses_for_unique_identifier() {
        let clauses =
            column_clauses(&sample_table(), &registry_with_link_target(), SqlDialect::MySql)
                .expect("clauses");
        assert_eq!(
            flat(&clauses),
            "`ID` INT UNSIGNED NOT NULL AUTO_INCREMENT, \
             `Label` VARCHAR(30), \
             `Value` INT UNSIGNED NOT NULL, \
             `Category` ENUM('val1','val2','val3') NOT NULL, \
             `LinkId` MEDIUMINT, \
             PRIMARY KEY (`ID`)"
        );
    }

    #[test]
    fn shared_identifier_gets_a_surrogate_key() {
        let table = TableSchema::with_columns(
            "Shared",
            vec![ColumnSpec::identifier_non_unique("ID", "MEDIUMINT NOT NULL")],
        )
        .expect("valid schema");
        let registry = SchemaRegistry::new();

        let sqlite =
            column_clauses(&table, &registry, SqlDialect::Sqlite).expect("clauses");
        assert_eq!(
            flat(&sqlite),
            "ID_primary INT NOT NULL PRIMARY KEY, ID MEDIUMINT NOT NULL"
        );

        let mysql = column_clauses(&table, &registry, SqlDialect::MySql).expect("clauses");
        assert_eq!(
            flat(&mysql),
            "`ID_primary` INT NOT NULL AUTO_INCREMENT, \
             `ID` MEDIUMINT NOT NULL, \
             PRIMARY KEY (`ID_primary`)"
        );
    }

    #[test]
    fn textual_identifiers_get_no_auto_increment() {
        let table = TableSchema::with_columns(
            "Codes",
            vec![ColumnSpec::identifier("Code", "VARCHAR(10) NOT NULL")],
        )
        .expect("valid schema");
        let mysql =
            column_clauses(&table, &SchemaRegistry::new(), SqlDialect::MySql).expect("clauses");
        assert_eq!(
            flat(&mysql),
            "`Code` VARCHAR(10) NOT NULL, PRIMARY KEY (`Code`)"
        );
    }

    #[test]
    fn declared_only_links_are_skipped() {
        let mut table = sample_table();
        table
            .add_column(ColumnSpec::link("Extra", "Misc").no_create())
            .expect("column");
        let clauses =
            column_clauses(&table, &registry_with_link_target(), SqlDialect::Sqlite)
                .expect("clauses");
        assert!(!clauses.contains("Extra"));
    }

    #[test]
    fn unknown_link_target_fails_loudly() {
        let table = TableSchema::with_columns(
            "Broken",
            vec![
                ColumnSpec::identifier("ID", "INT NOT NULL"),
                ColumnSpec::link("OtherId", "Nowhere"),
            ],
        )
        .expect("valid schema");
        let result = column_clauses(&table, &SchemaRegistry::new(), SqlDialect::Sqlite);
        assert!(matches!(result, Err(KorpusError::UnresolvedLink(_))));
    }

    #[test]
    fn create_table_wraps_the_clauses() {
        let table = TableSchema::with_columns(
            "Files",
            vec![
                ColumnSpec::identifier("FileId", "SMALLINT UNSIGNED NOT NULL"),
                ColumnSpec::column("Filename", "VARCHAR(256) NOT NULL"),
            ],
        )
        .expect("valid schema");
        let sql = create_table_sql(&table, &SchemaRegistry::new(), SqlDialect::Sqlite)
            .expect("create sql");
        assert_eq!(
            flat(&sql),
            "CREATE TABLE Files (FileId SMALLINT NOT NULL PRIMARY KEY, \
             Filename VARCHAR(256) NOT NULL COLLATE NOCASE)"
        );
    }

    #[test]
    fn enum_conversion_measures_the_longest_literal() {
        assert_eq!(
            enum_to_varchar("ENUM('open','close','empty') NOT NULL"),
            Some("VARCHAR(5) NOT NULL".to_string())
        );
        assert_eq!(enum_to_varchar("enum('a','bb')"), Some("VARCHAR(2)".to_string()));
        assert_eq!(enum_to_varchar("VARCHAR(30)"), None);
        assert_eq!(enum_to_varchar("INT UNSIGNED"), None);
    }

    #[test]
    fn enum_conversion_handles_quoted_commas_and_escapes() {
        // '' inside a literal is one quote character, not a terminator
        assert_eq!(
            enum_to_varchar(&crate::enum_type(["it's"], false)),
            Some("VARCHAR(4)".to_string())
        );
        // a comma inside a literal does not split it
        assert_eq!(
            enum_to_varchar("ENUM('a,b','c') NOT NULL"),
            Some("VARCHAR(3) NOT NULL".to_string())
        );
    }
}
