//! SQLite corpus store implementation

mod store;

pub use store::SqliteStore;
