//! enrol-server binary.
//!
//! Serves the enrolment API from a SQLite file. Configuration comes from
//! `--config` (default `config.toml`, optional) overlaid with `ENROL_*`
//! environment variables; see `config.example.toml` for the keys.
//!
//! `enrol-server --hash-password` reads a password from stdin and prints the
//! PHC string to put in `auth_password_hash`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use enrol_core::service::AccountService;
use enrol_server::{AppState, ServerConfig, auth};
use enrol_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Enrolment and role management API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = auth::hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let config = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
  let state = build_state(&config).await?;

  let address = format!("{}:{}", config.host, config.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(%address, "serving enrolment api");

  axum::serve(listener, enrol_server::router(state))
    .await
    .context("server error")
}

fn init_tracing() {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState<SqliteStore>> {
  let auth = config
    .auth()
    .map_err(|e| anyhow::anyhow!("invalid auth_password_hash: {e}"))?;

  let path = config.resolved_store_path();
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {}", path.display()))?;

  let policy = config.policy();
  tracing::info!(
    store = %path.display(),
    expiry_days = config.nomination_expiry_days,
    "store opened"
  );

  Ok(AppState {
    service: AccountService::new(Arc::new(store)).with_policy(policy),
    auth:    Arc::new(auth),
  })
}

fn read_password() -> anyhow::Result<String> {
  eprint!("Password: ");
  let line = std::io::stdin()
    .lines()
    .next()
    .context("no password on stdin")??;
  Ok(line)
}
