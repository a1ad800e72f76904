//! Korpus Stores - Database store implementations
//!
//! This crate bundles the concrete implementations of the [`CorpusStore`]
//! trait defined in `korpus-core`, plus a configuration type for opening
//! a store from settings.

#[cfg(feature = "mysql")]
pub use korpus_store_mysql as mysql;
#[cfg(feature = "sqlite")]
pub use korpus_store_sqlite as sqlite;

mod config;

pub use config::{StoreConfig, open_store};

/// Re-export commonly used types from korpus-core
pub use korpus_core::{CorpusStore, KorpusError, Result, Row, SqlDialect, Value};

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_store_dispatches_to_sqlite() {
        let config = StoreConfig::Sqlite {
            path: ":memory:".to_string(),
        };
        let store = open_store(&config).await.expect("open store");
        assert_eq!(store.dialect(), SqlDialect::Sqlite);

        store
            .execute("CREATE TABLE Files (FileId INT NOT NULL PRIMARY KEY)")
            .await
            .expect("create table");
        store
            .execute("INSERT INTO Files VALUES (1)")
            .await
            .expect("insert");
        let rows = store
            .query("SELECT FileId FROM Files")
            .await
            .expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), Some(&Value::Int(1)));
    }

    #[test]
    fn store_config_reads_from_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            backend = "sqlite"
            path = "bnc.db"
            "#,
        )
        .expect("parse sqlite config");
        assert!(matches!(config, StoreConfig::Sqlite { ref path } if path == "bnc.db"));

        let config: StoreConfig = toml::from_str(
            r#"
            backend = "mysql"
            host = "db.example.org"
            database = "coca"
            user = "corpus"
            "#,
        )
        .expect("parse mysql config");
        match config {
            StoreConfig::MySql {
                host,
                port,
                database,
                user,
                password,
            } => {
                assert_eq!(host, "db.example.org");
                assert_eq!(port, 3306);
                assert_eq!(database, "coca");
                assert_eq!(user.as_deref(), Some("corpus"));
                assert!(password.is_none());
            }
            other => panic!("expected mysql config, got {:?}", other),
        }
    }

    #[test]
    fn default_config_is_a_local_file() {
        let config = StoreConfig::default();
        assert_eq!(config.dialect(), SqlDialect::Sqlite);
    }
}
