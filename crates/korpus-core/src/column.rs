//! Column descriptions for corpus tables

use serde::{Deserialize, Serialize};

/// Build a VARCHAR type string for a table declaration
pub fn varchar(n: u32, not_null: bool) -> String {
    format!("VARCHAR({}){}", n, if not_null { " NOT NULL" } else { "" })
}

/// Build a SMALLINT type string for a table declaration
pub fn smallint(n: u32, unsigned: bool, not_null: bool) -> String {
    format!(
        "SMALLINT({}){}{}",
        n,
        if unsigned { " UNSIGNED" } else { "" },
        if not_null { " NOT NULL" } else { "" }
    )
}

/// Build a MEDIUMINT type string for a table declaration
pub fn mediumint(n: u32, unsigned: bool, not_null: bool) -> String {
    format!(
        "MEDIUMINT({}){}{}",
        n,
        if unsigned { " UNSIGNED" } else { "" },
        if not_null { " NOT NULL" } else { "" }
    )
}

/// Build a REAL type string for a table declaration
pub fn real(n: u32, m: u32, not_null: bool) -> String {
    format!("REAL({},{}){}", n, m, if not_null { " NOT NULL" } else { "" })
}

/// Build an ENUM type string for a table declaration
pub fn enum_type<'a>(values: impl IntoIterator<Item = &'a str>, not_null: bool) -> String {
    let literals: Vec<String> = values
        .into_iter()
        .map(|s| format!("'{}'", s.replace('\'', "''")))
        .collect();
    format!(
        "ENUM({}){}",
        literals.join(","),
        if not_null { " NOT NULL" } else { "" }
    )
}

/// Describes one column of a corpus table.
///
/// A column is either plain data, the table's identifier (primary key)
/// or a link to another table's identifier. Link columns carry no type
/// of their own; their effective type is resolved from the linked
/// table when DDL is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Declared SQL type, in MySQL notation; empty for links
    pub data_type: String,
    /// Whether this column is the table's identifier
    pub is_identifier: bool,
    /// Whether identifier values are unique per row.
    /// Non-unique identifiers get a hidden surrogate primary key.
    pub unique: bool,
    /// Name of the linked table, for link columns
    pub link_target: Option<String>,
    /// Whether the column is emitted in DDL. Links that alias an
    /// already declared column set this to false.
    pub create: bool,
    /// Index key prefix length for TEXT columns, if known
    pub index_length: Option<u32>,
}

impl ColumnSpec {
    /// A plain data column
    pub fn column(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_identifier: false,
            unique: false,
            link_target: None,
            create: true,
            index_length: None,
        }
    }

    /// The table's identifier column with unique values
    pub fn identifier(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            is_identifier: true,
            unique: true,
            ..Self::column(name, data_type)
        }
    }

    /// An identifier whose values may repeat across rows
    pub fn identifier_non_unique(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            is_identifier: true,
            unique: false,
            ..Self::column(name, data_type)
        }
    }

    /// A foreign-key column referencing `table`'s identifier
    pub fn link(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            link_target: Some(table.into()),
            ..Self::column(name, "")
        }
    }

    /// Mark this column as declared-only: it participates in link
    /// resolution but is not emitted in DDL
    pub fn no_create(mut self) -> Self {
        self.create = false;
        self
    }

    /// Set the index key prefix length
    pub fn with_index_length(mut self, length: u32) -> Self {
        self.index_length = Some(length);
        self
    }

    /// Whether this column links to another table
    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }

    /// The base SQL type without length or qualifiers,
    /// e.g. `VARCHAR` for `VARCHAR(30) NOT NULL`
    pub fn base_type(&self) -> String {
        self.data_type
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split('(')
            .next()
            .unwrap_or("")
            .to_uppercase()
    }

    /// Whether the declared type is numeric
    pub fn is_numeric(&self) -> bool {
        let base = self.base_type();
        base.ends_with("INT")
            || matches!(base.as_str(), "FLOAT" | "REAL" | "DECIMAL" | "NUMERIC" | "DOUBLE")
    }

    /// The column name as it appears in the created table: identifiers
    /// with non-unique values are shadowed by a surrogate key column
    pub fn alias(&self) -> String {
        if self.is_identifier && !self.unique {
            format!("{}_primary", self.name)
        } else {
            self.name.clone()
        }
    }
}
