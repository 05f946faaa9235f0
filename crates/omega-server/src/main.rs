//! omega-server binary.
//!
//! Reads `omega.toml` (or the path given with `--config`) layered with
//! `OMEGA_`-prefixed environment variables, opens the SQLite store, and
//! either serves the JSON API or runs a one-off recomputation.
//!
//! ```text
//! omega-server serve
//! omega-server recompute --asset BTC --asset ETH --from 2024-01-01 --to 2024-03-31
//! ```
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `OMEGA_ENGINE__ALPHA=0.3`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use omega_core::{config::EngineConfig, engine::FusionEngine, store::DateRange};
use omega_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `omega.toml` and the environment.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct ServerConfig {
  host:       String,
  port:       u16,
  store_path: PathBuf,
  engine:     EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("omega.db"),
      engine:     EngineConfig::default(),
    }
  }
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("OMEGA")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  cfg.engine.validate().context("invalid engine configuration")?;
  Ok(cfg)
}

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Omega factor & sentiment fusion engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "omega.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,

  /// Recompute daily sentiment and factors for one or more assets.
  Recompute {
    /// Asset symbol; repeat for several assets.
    #[arg(long = "asset", required = true)]
    assets: Vec<String>,

    /// First day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Last day, inclusive (YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = load_config(&cli.config)?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Arc::new(
    FusionEngine::new(Arc::new(store), cfg.engine.clone()).context("failed to build engine")?,
  );

  match cli.command {
    Command::Serve => serve(engine, &cfg).await,
    Command::Recompute { assets, from, to } => {
      let range = DateRange::new(from, to).context("invalid date range")?;
      recompute(engine, assets, range).await
    }
  }
}

async fn serve(engine: Arc<FusionEngine<SqliteStore>>, cfg: &ServerConfig) -> anyhow::Result<()> {
  let app = omega_api::api_router(engine);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn recompute(
  engine: Arc<FusionEngine<SqliteStore>>,
  assets: Vec<String>,
  range: DateRange,
) -> anyhow::Result<()> {
  let results = engine.recompute_many(assets, range).await;

  let mut failed = 0;
  for (asset, result) in &results {
    match result {
      Ok(r) => println!(
        "{asset}: {} days, {} inserted, {} updated",
        r.days_processed, r.factors_inserted, r.factors_updated
      ),
      Err(e) => {
        failed += 1;
        eprintln!("{asset}: failed: {e}");
      }
    }
  }

  if failed > 0 {
    anyhow::bail!("{failed} of {} assets failed to recompute", results.len());
  }
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
