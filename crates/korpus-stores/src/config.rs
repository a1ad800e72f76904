//! Store selection and connection settings

use korpus_core::{CorpusStore, Result, SqlDialect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(not(all(feature = "sqlite", feature = "mysql")))]
use korpus_core::KorpusError;

/// Connection settings for a corpus store.
///
/// Deserializes from the `[store]` section of a build configuration:
///
/// ```toml
/// backend = "sqlite"
/// path = "bnc.db"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database file, or `":memory:"`
    Sqlite { path: String },
    /// MySQL/MariaDB server
    MySql {
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        database: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

fn default_mysql_port() -> u16 {
    3306
}

impl StoreConfig {
    /// The SQL dialect the configured backend speaks
    pub fn dialect(&self) -> SqlDialect {
        match self {
            StoreConfig::Sqlite { .. } => SqlDialect::Sqlite,
            StoreConfig::MySql { .. } => SqlDialect::MySql,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: "korpus.db".to_string(),
        }
    }
}

/// Open the store a configuration describes
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CorpusStore>> {
    match config {
        StoreConfig::Sqlite { path } => {
            #[cfg(feature = "sqlite")]
            {
                Ok(Arc::new(crate::sqlite::SqliteStore::open(path)?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                let _ = path;
                Err(KorpusError::Configuration(
                    "built without SQLite support".into(),
                ))
            }
        }
        StoreConfig::MySql {
            host,
            port,
            database,
            user,
            password,
        } => {
            #[cfg(feature = "mysql")]
            {
                let store = crate::mysql::MySqlStore::connect(
                    host,
                    *port,
                    database,
                    user.as_deref(),
                    password.as_deref(),
                )
                .await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "mysql"))]
            {
                let _ = (host, port, database, user, password);
                Err(KorpusError::Configuration(
                    "built without MySQL support".into(),
                ))
            }
        }
    }
}
