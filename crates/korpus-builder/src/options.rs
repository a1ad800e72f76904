//! Build-run configuration

use serde::{Deserialize, Serialize};

/// Tunables for one corpus build run.
///
/// Deserializes from the `[builder]` section of a build configuration
/// file; every field has a default, so a missing section works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Buffered rows per table above which `add` flushes the table as a
    /// side effect
    pub flush_threshold: usize,
    /// Window width of the n-gram lookup table; `None` skips building it
    pub ngram_width: Option<u32>,
    /// Upper bound on the rows one n-gram fill chunk may generate; the
    /// chunk size is this budget divided by the window width
    pub join_budget: usize,
    /// Sentinel stored in n-gram key columns whose window runs past the
    /// last token, when the key column is not a link
    pub na_literal: String,
    /// Fold text case in the dedup index, matching a case-insensitive
    /// store collation
    pub case_insensitive: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            flush_threshold: 100_000,
            ngram_width: None,
            join_budget: 250_000,
            na_literal: "<na>".to_string(),
            case_insensitive: false,
        }
    }
}
