//! MySQL/MariaDB corpus store implementation

mod store;

pub use store::MySqlStore;
