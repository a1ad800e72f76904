//! `korpus` - build corpus databases from plain-text files
//!
//! A generic installer over the korpus build layer: it ingests
//! whitespace-tokenized text files into the standard Lexicon / Files /
//! Corpus layout and drives the full build sequence (create tables,
//! load, optimize types, materialize the n-gram lookup table, create
//! indices). Everything here goes through the public builder
//! operations; corpus-specific installers would look just like this.

use anyhow::Context;
use clap::{Parser, Subcommand};
use korpus_builder::{BuilderOptions, CorpusBuilder, ngram_table_name};
use korpus_core::{ColumnSpec, SchemaRegistry, SqlDialect, TableSchema, Value, create_table_sql};
use korpus_stores::{StoreConfig, open_store};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// The column of the token table the n-gram window slides over
const TOKEN_KEY: &str = "WordId";

#[derive(Parser)]
#[command(
    name = "korpus",
    about = "Build corpus databases from plain-text files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a directory of text files and run the full build sequence
    Build(BuildArgs),
    /// Rebuild the n-gram lookup table of an existing corpus database
    Ngram(NgramArgs),
    /// Print the CREATE TABLE statements for the standard corpus layout
    Ddl(DdlArgs),
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Directory containing the plain-text corpus files
    corpus_dir: PathBuf,

    /// SQLite database file to build into (overridden by a [store]
    /// section in --config)
    #[arg(long, default_value = "korpus.db")]
    db: String,

    /// TOML build configuration with [store] and [builder] sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Window width of the n-gram lookup table; omitting it skips the
    /// table unless the configuration sets a width
    #[arg(long)]
    ngram_width: Option<u32>,

    /// Do not create column indices after the load
    #[arg(long)]
    skip_indices: bool,
}

#[derive(clap::Args)]
struct NgramArgs {
    /// SQLite database file holding the built corpus
    #[arg(long, default_value = "korpus.db")]
    db: String,

    /// TOML build configuration with [store] and [builder] sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Window width of the rebuilt lookup table
    #[arg(long, default_value_t = 2)]
    width: u32,
}

#[derive(clap::Args)]
struct DdlArgs {
    /// SQL dialect to emit: "sqlite" or "mysql"
    #[arg(long, default_value = "sqlite")]
    dialect: String,
}

/// On-disk build configuration; both sections are optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BuildConfig {
    store: Option<StoreConfig>,
    builder: BuilderOptions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Build(args) => run_build(args).await,
        Command::Ngram(args) => run_ngram(args).await,
        Command::Ddl(args) => run_ddl(args),
    }
}

async fn run_build(args: BuildArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut options = config.builder;
    if let Some(width) = args.ngram_width {
        options.ngram_width = Some(width);
    }
    let store_config = config.store.unwrap_or(StoreConfig::Sqlite {
        path: args.db.clone(),
    });

    let store = open_store(&store_config).await?;
    let mut builder = CorpusBuilder::new(store, options.clone());
    declare_standard_layout(&mut builder)?;
    builder.create_all_tables().await?;

    let stop = builder.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("stop requested, aborting at the next boundary");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let files = corpus_files(&args.corpus_dir)?;
    if files.is_empty() {
        anyhow::bail!("no files found in {}", args.corpus_dir.display());
    }
    for path in files {
        builder.check_cancelled()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if builder
            .find("Files", &[("Filename", Value::from(name.clone()))])
            .await?
            .is_some()
        {
            tracing::info!(file = %name, "already loaded, skipping");
            continue;
        }
        ingest_file(&mut builder, &path, &name).await?;
        builder.commit_all().await?;
    }

    builder.optimize_column_types().await?;
    if let Some(width) = options.ngram_width {
        builder.build_ngram_lookup(width).await?;
    }
    if !args.skip_indices {
        builder.create_indices().await?;
    }
    builder.store().close().await?;
    tracing::info!("corpus build finished");
    Ok(())
}

async fn run_ngram(args: NgramArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store_config = config.store.unwrap_or(StoreConfig::Sqlite {
        path: args.db.clone(),
    });

    let store = open_store(&store_config).await?;
    let mut builder = CorpusBuilder::new(store, config.builder);
    declare_standard_layout(&mut builder)?;

    // a stale lookup table would shadow the rebuilt one
    builder
        .store()
        .drop_table(&ngram_table_name("Corpus"))
        .await?;
    builder.build_ngram_lookup(args.width).await?;
    builder.store().close().await?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    let Some(path) = path else {
        return Ok(BuildConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run_ddl(args: DdlArgs) -> anyhow::Result<()> {
    let dialect = parse_dialect(&args.dialect)?;
    let registry = standard_registry()?;
    for schema in registry.values() {
        println!("{};\n", create_table_sql(schema, &registry, dialect)?);
    }
    Ok(())
}

async fn ingest_file(
    builder: &mut CorpusBuilder,
    path: &Path,
    name: &str,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_id = builder
        .add(
            "Files",
            &[
                ("Filename", Value::from(name)),
                ("Path", Value::from(parent)),
            ],
        )
        .await?;

    let mut tokens = 0u64;
    for token in text.split_whitespace() {
        let word_id = builder
            .get_or_insert(
                "Lexicon",
                &[
                    ("Lemma", Value::from(token.to_lowercase())),
                    ("Word", Value::from(token)),
                ],
            )
            .await?;
        builder
            .add_token(&[
                ("WordId", Value::Int(word_id)),
                ("FileId", Value::Int(file_id)),
            ])
            .await?;
        tokens += 1;
    }
    tracing::info!(file = %name, tokens, "file loaded");
    Ok(())
}

fn lexicon_table() -> korpus_core::Result<TableSchema> {
    TableSchema::with_columns(
        "Lexicon",
        vec![
            ColumnSpec::identifier("WordId", "INT UNSIGNED NOT NULL"),
            ColumnSpec::column("Lemma", "VARCHAR(1024) NOT NULL"),
            ColumnSpec::column("Word", "VARCHAR(1024) NOT NULL"),
        ],
    )
}

fn files_table() -> korpus_core::Result<TableSchema> {
    TableSchema::with_columns(
        "Files",
        vec![
            ColumnSpec::identifier("FileId", "INT UNSIGNED NOT NULL"),
            ColumnSpec::column("Filename", "VARCHAR(1024) NOT NULL"),
            ColumnSpec::column("Path", "VARCHAR(4048) NOT NULL"),
        ],
    )
}

fn corpus_table() -> korpus_core::Result<TableSchema> {
    TableSchema::with_columns(
        "Corpus",
        vec![
            ColumnSpec::identifier("ID", "BIGINT UNSIGNED NOT NULL"),
            ColumnSpec::link(TOKEN_KEY, "Lexicon"),
            ColumnSpec::link("FileId", "Files"),
        ],
    )
}

fn declare_standard_layout(builder: &mut CorpusBuilder) -> anyhow::Result<()> {
    builder.declare_table(lexicon_table()?)?;
    builder.declare_table(files_table()?)?;
    builder.declare_token_table(corpus_table()?, TOKEN_KEY)?;
    Ok(())
}

fn standard_registry() -> anyhow::Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    for schema in [lexicon_table()?, files_table()?, corpus_table()?] {
        registry.insert(schema.name().to_string(), schema);
    }
    Ok(registry)
}

/// All regular files in the corpus directory, sorted by name
fn corpus_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_dialect(name: &str) -> anyhow::Result<SqlDialect> {
    match name.to_lowercase().as_str() {
        "sqlite" => Ok(SqlDialect::Sqlite),
        "mysql" => Ok(SqlDialect::MySql),
        other => anyhow::bail!("unknown dialect {other:?}, expected \"sqlite\" or \"mysql\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_declaration_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn standard_layout_declares_cleanly() {
        let registry = standard_registry().expect("registry");
        assert_eq!(
            registry.keys().collect::<Vec<_>>(),
            vec!["Lexicon", "Files", "Corpus"]
        );
        for schema in registry.values() {
            for dialect in [SqlDialect::Sqlite, SqlDialect::MySql] {
                create_table_sql(schema, &registry, dialect).expect("valid DDL");
            }
        }
    }

    #[test]
    fn corpus_links_resolve_to_their_identifier_types() {
        let registry = standard_registry().expect("registry");
        let sql = create_table_sql(&registry["Corpus"], &registry, SqlDialect::MySql)
            .expect("valid DDL");
        assert!(sql.contains("`WordId` INT UNSIGNED NOT NULL"));
        assert!(sql.contains("`FileId` INT UNSIGNED NOT NULL"));
    }

    #[test]
    fn config_file_sections_are_optional() {
        let config: BuildConfig = toml::from_str("").expect("empty config");
        assert!(config.store.is_none());
        assert_eq!(config.builder.join_budget, 250_000);

        let config: BuildConfig = toml::from_str(
            r#"
            [store]
            backend = "sqlite"
            path = "bnc.db"

            [builder]
            ngram_width = 3
            "#,
        )
        .expect("full config");
        assert!(matches!(config.store, Some(StoreConfig::Sqlite { .. })));
        assert_eq!(config.builder.ngram_width, Some(3));
    }

    #[test]
    fn config_files_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("korpus.toml");
        std::fs::write(&path, "[builder]\nflush_threshold = 42\n").expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.builder.flush_threshold, 42);
        assert!(config.store.is_none());

        let config = load_config(None).expect("default config");
        assert_eq!(config.builder.flush_threshold, 100_000);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn dialect_names_parse() {
        assert_eq!(parse_dialect("sqlite").expect("sqlite"), SqlDialect::Sqlite);
        assert_eq!(parse_dialect("MySQL").expect("mysql"), SqlDialect::MySql);
        assert!(parse_dialect("postgres").is_err());
    }
}
