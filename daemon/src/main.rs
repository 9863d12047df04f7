mod command;
mod config;
mod control;
mod error;
mod event;
mod line;
mod logging;
mod output;
mod paths;
mod resolver;
mod supervisor;
mod table;
mod volume;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use crate::command::ExternalCommand;
use crate::control::{Action, Dispatcher};
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::volume::VolumeProbe;

/// Waybar media player module: prints one JSON line per playback change.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.config/waybar/mediaplayer_config.json.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// `play_pause`, `next` or `previous` sends that command and exits.
    /// Anything else (or nothing) starts the monitor; extra words are ignored.
    #[arg(value_name = "ACTION", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn action(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ── Config directory ──────────────────────────────────────────────────────
    let config_path = match prepare_config_dir(cli.config.clone()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("mediaplayer: {e:#}");
            std::process::exit(1);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    let _log_guard = match logging::init(&paths::log_file_path(&config_path)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("mediaplayer: logging disabled: {e:#}");
            None
        }
    };
    let args: Vec<String> = std::env::args().collect();
    logging::log_script_start(&args);

    // ── One-shot control action ───────────────────────────────────────────────
    if let Some(name) = cli.action().filter(|a| Action::is_known(a)) {
        Dispatcher::default().dispatch(name).await;
        logging::log_script_end();
        return;
    }
    if !cli.args.is_empty() {
        tracing::debug!("Ignoring unrecognized arguments {:?}", cli.args);
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = config::load_or_create(&config_path).unwrap_or_else(|e| {
        tracing::error!("Failed to load config (using defaults): {e}");
        config::Config::default()
    });

    // ── Supervisor loop ───────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown_signal(shutdown_tx));

    let mut supervisor = Supervisor::new(
        config,
        ExternalCommand::metadata_follow(),
        VolumeProbe::default(),
        SupervisorOptions::default(),
        std::io::stdout(),
        shutdown_rx,
    );
    supervisor.run().await;

    logging::log_script_end();
}

/// Resolves the config file path and creates its directory.
fn prepare_config_dir(override_path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match override_path {
        Some(path) => path,
        None => paths::config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }
    Ok(path)
}

/// Waits for SIGINT or SIGTERM and flips the shutdown flag.
///
/// The sender is held for the life of the task, so the supervisor never sees
/// a closed channel before a real signal arrives.
async fn forward_shutdown_signal(tx: watch::Sender<bool>) {
    wait_for_signal().await;
    tracing::info!("Received termination signal, shutting down");
    let _ = tx.send(true);
    std::future::pending::<()>().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to install SIGTERM handler: {e}");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

/// Never resolves if the Ctrl+C handler cannot be installed.
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}
