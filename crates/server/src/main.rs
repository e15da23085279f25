//! Residency server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use residency_core::config::AppConfig;
use residency_core::{JwtVerifier, Principal};
use residency_server::bootstrap::prepare_storage;
use residency_server::persistence::{MemoryReportRepository, ReportRepository};
use residency_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_PREFIX: &str = "RESIDENCY_";
const CONFIG_ENV: &str = "RESIDENCY_CONFIG";

/// Residency report backend
#[derive(Parser, Debug)]
#[command(name = "residencyd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "RESIDENCY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a bearer token signed with the configured secret
    IssueToken {
        /// User id to put in the `sub` claim
        #[arg(long)]
        subject: String,
        /// Role id claim
        #[arg(long, default_value_t = 1)]
        role_id: i64,
    },
}

/// Layer the optional TOML file under `RESIDENCY_`-prefixed env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = Path::new(path);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with(ENV_PREFIX) && key != CONFIG_ENV);

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: residencyd --config /path/to/config.toml\n  \
             2. Environment variables: RESIDENCY_AUTH__JWT_SECRET=... \
             RESIDENCY_UPLOADS__ROOT=/var/lib/residency/uploads residencyd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set RESIDENCY_CONFIG env var to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")
}

fn issue_token(config: &AppConfig, subject: String, role_id: i64) -> Result<String> {
    JwtVerifier::from_config(&config.auth)
        .issue(&Principal::new(subject, role_id))
        .map_err(|e| anyhow::anyhow!("failed to issue token: {e}"))
}

async fn serve(config: AppConfig) -> Result<()> {
    residency_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = residency_storage::from_config(&config.uploads)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(root = %config.uploads.root.display(), "Upload storage initialized");

    prepare_storage(storage.as_ref()).await?;

    let reports: Arc<dyn ReportRepository> = Arc::new(MemoryReportRepository::new());
    tracing::warn!("Using in-memory report repository; reports are lost on restart");

    let bind = config.server.bind.clone();
    let state = AppState::new(config, storage, reports).context("invalid configuration")?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args.config)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("residencyd v{}", env!("CARGO_PKG_VERSION"));
            serve(config).await
        }
        Command::IssueToken { subject, role_id } => {
            println!("{}", issue_token(&config, subject, role_id)?);
            Ok(())
        }
    }
}
