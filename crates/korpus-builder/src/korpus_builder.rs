//! Korpus Builder - Build orchestration for corpus databases
//!
//! This crate drives a full corpus build against a store: declaring the
//! table schemas, buffering and flushing source records, tightening
//! column types after the load, materializing the n-gram lookup table
//! and creating indices. Installers and the CLI call only the
//! [`CorpusBuilder`] operations defined here.

mod builder;
mod ngram;
mod options;
#[cfg(test)]
mod test_support;

pub use builder::CorpusBuilder;
pub use ngram::{NgramPhase, ngram_schema, ngram_table_name};
pub use options::BuilderOptions;
