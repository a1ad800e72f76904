//! Korpus Core - Schema and materialization layer for corpus databases
//!
//! This crate provides the fundamental types that the builder and the
//! store backends depend on. It defines:
//!
//! - `ColumnSpec` - Column descriptions (plain, identifier, link)
//! - `TableSchema` - Ordered columns plus the insertion cache and dedup index
//! - `CorpusStore` - Trait for database store implementations
//! - DDL generation for the supported SQL dialects
//! - Column type optimization from observed data
//! - Common types like `Value`, `Row`, `KorpusError`

mod column;
mod ddl;
mod error;
mod store;
mod table;
#[cfg(test)]
mod test_store;
mod typeopt;
mod types;

pub use column::*;
pub use ddl::*;
pub use error::*;
pub use store::*;
pub use table::*;
pub use typeopt::*;
pub use types::*;
