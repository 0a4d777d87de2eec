//! Quarry command line.
//!
//! Usage:
//!   quarry explain --metadata demos/product.toml --query "filter=price:gte:10&sort=price:asc"
//!   quarry run --metadata demos/product.toml --query "search=widget&pageSize=5"
//!   quarry check --metadata demos/product.toml --database

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use quarry::config::Config;
use quarry::store::SqlRenderer;
use quarry::{EntityQueryMetadata, PgJsonStore, QueryExecutor, QueryParameters, QueryPlan, db};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SQL a list request would run.
    Explain {
        /// Entity metadata file (TOML).
        #[arg(long)]
        metadata: PathBuf,

        /// Request query string (`page`, `pageSize`, `sort`, `search`, `filter`).
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Run a list request against DATABASE_URL and print the page as JSON.
    Run {
        /// Entity metadata file (TOML).
        #[arg(long)]
        metadata: PathBuf,

        /// Request query string (`page`, `pageSize`, `sort`, `search`, `filter`).
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Validate a metadata file.
    Check {
        /// Entity metadata file (TOML).
        #[arg(long)]
        metadata: PathBuf,

        /// Also check that DATABASE_URL is reachable.
        #[arg(long)]
        database: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    match Cli::parse().command {
        Command::Explain { metadata, query } => {
            let metadata = load_metadata(&metadata)?;
            let params = QueryParameters::from_query_string(&query);
            metadata.ensure_valid()?;
            let plan = QueryPlan::build(&metadata, &params)?;
            let renderer = SqlRenderer::new(&plan);
            println!("{};", renderer.build_count());
            println!("{};", renderer.build_select());
        }
        Command::Run { metadata, query } => {
            let metadata = load_metadata(&metadata)?;
            let params = QueryParameters::from_query_string(&query);
            let config = Config::from_env()?;
            let pool = db::create_pool(&config).await?;
            let executor = QueryExecutor::new(PgJsonStore::from_config(pool, &config));
            let page = executor.execute(&metadata, &params).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&page).context("failed to serialize page")?
            );
        }
        Command::Check { metadata, database } => {
            let path = metadata;
            let metadata = load_metadata(&path)?;
            let problems = metadata.validate();
            if !problems.is_empty() {
                for problem in &problems {
                    eprintln!("{}: {problem}", path.display());
                }
                anyhow::bail!("{} problem(s) in {}", problems.len(), path.display());
            }
            println!("{}: ok ({})", path.display(), metadata.entity);

            if database {
                let config = Config::from_env()?;
                let pool = db::create_pool(&config).await?;
                let version = db::server_version(&pool).await?;
                println!("database: ok (PostgreSQL {version})");
            }
        }
    }

    Ok(())
}

fn load_metadata(path: &Path) -> Result<EntityQueryMetadata> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    EntityQueryMetadata::from_toml_str(&source)
        .with_context(|| format!("failed to parse metadata in {}", path.display()))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
