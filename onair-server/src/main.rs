//! # onair server
//!
//! Keeps the broadcast automation engine in line with the content system of
//! record and serves a versioned feed of what is about to air.
//!
//! ```text
//! onair-server [serve] [--host H] [--port P] [--config FILE] [--env-file FILE]
//! onair-server check-config [--config FILE]
//! onair-server reconcile [--dry-run] [--config FILE]
//! ```

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use onair_config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigWarnings};
use onair_server::{
    AppState, infra::refresher::spawn_feed_refresher, routes::create_router,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "onair-server")]
#[command(about = "Schedule reconciliation and feed service for broadcast automation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to onair.toml (defaults to ONAIR_CONFIG, then ./onair.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dotenv file to load before reading the environment (defaults to ./.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Load and validate configuration, print warnings, and exit
    CheckConfig,
    /// Run one envelope reconciliation and print the report as JSON
    Reconcile {
        /// Compute the diff without touching the automation engine
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = ConfigLoaderOptions {
        config_path: cli.config,
        env_file: cli.env_file,
    };

    match cli.command {
        None => run_server(options, cli.serve).await,
        Some(Command::Serve(args)) => run_server(options, args).await,
        Some(Command::CheckConfig) => check_config(options),
        Some(Command::Reconcile { dry_run }) => reconcile_once(options, dry_run).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(options: ConfigLoaderOptions) -> anyhow::Result<ConfigLoad> {
    let load = ConfigLoader::with_options(options)
        .load()
        .context("failed to load configuration")?;
    log_warnings(&load.warnings);
    Ok(load)
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
}

fn check_config(options: ConfigLoaderOptions) -> anyhow::Result<()> {
    let load = load_config(options)?;
    match load.config_path() {
        Some(path) => info!(path = %path.display(), "configuration is valid"),
        None => info!("configuration is valid (environment and defaults only)"),
    }
    if !load.warnings.is_empty() {
        info!(warnings = load.warnings.items.len(), "review the warnings above");
    }
    Ok(())
}

async fn reconcile_once(options: ConfigLoaderOptions, dry_run: bool) -> anyhow::Result<()> {
    let ConfigLoad { config, .. } = load_config(options)?;
    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.clone())?;
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let window = state.reconciler.envelope();
    info!(window = %window, dry_run, "running one-shot reconciliation");
    let report = state
        .reconciler
        .reconcile(&window, dry_run, shutdown.child_token())
        .await
        .context("reconciliation failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success() {
        bail!(
            "reconciliation finished with {} failed operation(s){}",
            report.failed.len(),
            if report.cancelled { " and was cancelled" } else { "" }
        );
    }
    Ok(())
}

async fn run_server(options: ConfigLoaderOptions, args: ServeArgs) -> anyhow::Result<()> {
    let ConfigLoad { mut config, .. } = load_config(options)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.clone())?;
    let refresher = spawn_feed_refresher(&state);
    let app = create_router(state);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "onair server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Some(handle) = refresher
        && let Err(err) = handle.await
    {
        error!(error = %err, "feed refresher task panicked");
    }
    info!("onair server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `token` so in-flight work stops
/// issuing remote calls.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }
    info!("shutdown signal received");
    token.cancel();
}
