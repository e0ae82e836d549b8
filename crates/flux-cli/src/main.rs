//! fluxctl: runs the FluxVision ingestion pipeline.
//!
//! Reads `fluxvision.toml` (or the path given with `--config`) layered under
//! `FLUX_*` environment variables, opens the SQLite warehouse, runs one
//! sub-command and prints its report as JSON on stdout.
//!
//! ```text
//! fluxctl check --force
//! fluxctl promote all
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use flux_core::family::FactFamily;
use flux_etl::{config::expand_tilde, Pipeline, PipelineConfig};
use flux_store_sqlite::SqliteWarehouse;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "FluxVision ingestion pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "fluxvision.toml")]
  config: PathBuf,

  /// Directory holding the source exports; overrides `data_root`.
  #[arg(long)]
  data_root: Option<PathBuf>,

  /// SQLite database file; overrides `store_path`.
  #[arg(long)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load changed source files into their staging tables.
  Check {
    /// Reload every present file, even when unchanged.
    #[arg(long)]
    force: bool,
  },
  /// Report presence and metadata of the expected source files.
  Status,
  /// Promote a staging table (or `all`) into production.
  Promote {
    /// Family slug, table name, or `all`.
    family: String,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  #[serde(flatten)]
  pipeline:   PipelineConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("fluxvision.db") }

fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FLUX").try_parsing(true))
    .build()
    .context("failed to read config file")?;

  let mut cfg: CliConfig = settings
    .try_deserialize()
    .context("failed to deserialise configuration")?;
  if let Some(data_root) = cli.data_root {
    cfg.pipeline.data_root = data_root;
  }
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteWarehouse::open(&store_path)
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let mut pipeline = Pipeline::new(store, cfg.pipeline.expand_paths());

  match cli.command {
    Command::Check { force } => print_json(&pipeline.check(force)),
    Command::Status => print_json(&pipeline.status()),
    Command::Promote { family } if family.eq_ignore_ascii_case("all") => {
      print_json(&pipeline.promote_all())
    }
    Command::Promote { family } => {
      let family: FactFamily = family.parse().context("invalid family")?;
      print_json(&pipeline.promote(family))
    }
  }
}

fn print_json<T: Serialize>(report: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(report).context("failed to serialise report")?;
  println!("{json}");
  Ok(())
}
