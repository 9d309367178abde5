//! Arogya payment server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite ledger, and serves the payment API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash` in
//! config.toml:
//!
//! ```
//! cargo run -p arogya-api --bin server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use arogya_api::{AppState, FsProofStore, ServerConfig, auth::AuthConfig};
use arogya_core::engine::VerificationEngine;
use arogya_gateway::GatewayConfig;
use arogya_store_sqlite::SqliteStore;
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Arogya payment verification server")]
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
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("AROGYA"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in filesystem paths.
  let store_path = expand_tilde(&server_cfg.store_path);
  let upload_dir = expand_tilde(&server_cfg.upload_dir);

  // Open the ledger and the proof directory.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open ledger at {store_path:?}"))?;

  let proofs = FsProofStore::new(&upload_dir);
  proofs
    .ensure_dir()
    .await
    .with_context(|| format!("failed to create upload dir {upload_dir:?}"))?;

  // Build application state.
  let state = AppState {
    engine:  VerificationEngine::new(Arc::new(store)),
    proofs:  Arc::new(proofs),
    auth:    Arc::new(AuthConfig {
      username:      server_cfg.admin_username.clone(),
      password_hash: server_cfg.admin_password_hash.clone(),
    }),
    gateway: Arc::new(GatewayConfig {
      salt_key:   server_cfg.gateway_salt_key.clone(),
      salt_index: server_cfg.gateway_salt_index,
    }),
  };

  let app = arogya_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
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
