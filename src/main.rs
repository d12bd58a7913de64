//! als-ops server binary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use als_ops::api::{self, AppState};
use als_ops::config::Config;
use als_ops::runner::TrainingRunner;
use als_ops::store::MemoryStore;

/// Training operations service for the ALS recommender
#[derive(Parser, Debug)]
#[command(name = "als-ops", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let store = Arc::new(MemoryStore::new(
        config.seed_schedule().context("seeding schedule")?,
    ));
    let mut state = AppState::new(Arc::clone(&store), &config);

    match &config.training.command {
        Some(command) => {
            let mut runner = TrainingRunner::new(state.registry.clone(), state.catalog.clone(), command)
                .context("configuring training runner")?
                .with_artifact_dir(config.training.artifact_dir.clone())
                .with_timeout(config.training.timeout());
            if let Some(dir) = &config.training.working_dir {
                runner = runner.with_working_dir(dir.clone());
            }
            info!(command = %command.join(" "), "Training runner enabled");
            state = state.with_runner(runner.spawn());
        }
        None => warn!("No training.command configured; triggered runs stay queued"),
    }

    api::serve(state, &config.server)
        .await
        .context("serving HTTP API")?;
    Ok(())
}
