//! mmsa-fusion - Main entry point
//!
//! Reads newline-delimited JSON requests from stdin and writes one JSON
//! response per line to stdout. A request is either an array of modality
//! predictions or a control command such as
//! `{"command": "update_weights", "weights": {"text": 0.6}}`.
//! Logs go to stderr. EOF or Ctrl-C shuts the engine down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mmsa_common::config::{resolve_environment, ConfigPathResolver};
use mmsa_common::logging::{init_logging, LoggingConfig};
use mmsa_fusion::{
    ConfigError, FusionEngine, FusionPolicy, PolicyEventBus, PolicyLoader, PolicyStore,
    ReloadOutcome, ReloadSupervisor, RequestHandler, RuntimeControl,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for mmsa-fusion
#[derive(Parser, Debug)]
#[command(name = "mmsa-fusion")]
#[command(about = "Multimodal sentiment fusion engine with hot-reloadable policy")]
#[command(version)]
struct Args {
    /// Policy file (TOML); falls back to MMSA_FUSION_CONFIG and the standard locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment override block to apply
    #[arg(short, long)]
    environment: Option<String>,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&LoggingConfig {
        level: args.log_level.clone(),
        ansi: false,
    })?;

    info!(
        "Starting mmsa-fusion v{} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("MMSA_GIT_HASH"),
        env!("MMSA_BUILD_PROFILE"),
        env!("MMSA_BUILD_TIMESTAMP")
    );

    let (config_path, origin) = ConfigPathResolver::new(args.config).resolve();
    let environment = resolve_environment(args.environment.as_deref());
    info!("Policy file: {} (from {})", config_path.display(), origin);
    if let Some(env) = &environment {
        info!("Environment: {}", env);
    }

    let store = Arc::new(PolicyStore::new(FusionPolicy::default()));
    let events = PolicyEventBus::default();
    let supervisor = Arc::new(ReloadSupervisor::new(
        config_path.clone(),
        PolicyLoader::new().with_environment(environment),
        Arc::clone(&store),
        events.clone(),
    ));

    // The built-in defaults stay active until a valid policy file appears
    match supervisor.force_reload().await {
        ReloadOutcome::Reloaded { revision, .. } => {
            info!("Initial policy loaded (revision {})", revision)
        }
        ReloadOutcome::Failed(ConfigError::Io { .. }) => {
            warn!(
                "Policy file {} not readable, running with built-in defaults",
                config_path.display()
            )
        }
        ReloadOutcome::Failed(e) => {
            warn!(
                "Policy file {} rejected ({}), running with built-in defaults",
                config_path.display(),
                e
            )
        }
        ReloadOutcome::Unchanged => {}
    }

    let cancel = CancellationToken::new();
    let reload_task = Arc::clone(&supervisor).spawn(cancel.clone());

    let handler = RequestHandler::new(
        FusionEngine::new(Arc::clone(&store)),
        RuntimeControl::new(store, events).with_supervisor(supervisor),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };

        let Some(line) = line else {
            info!("Input closed, shutting down");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handler.handle_line(&line).await;
        let mut out = serde_json::to_vec(&response).context("Failed to encode response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    cancel.cancel();
    reload_task.await.context("Reload task panicked")?;
    info!("mmsa-fusion stopped");

    Ok(())
}
