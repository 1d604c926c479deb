//! pinward - keeps keypad lock codes in sync across a fleet of locks.
//!
//! ```text
//! pinward --config pinward.toml          run the coordinator
//! pinward --config pinward.toml check    validate the config and exit
//! ```
//!
//! Only the in-memory `mock` platform ships with this binary, so `run` is
//! mostly useful for exercising configuration and logging.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pinward_core::CoordinatorConfig;
use pinward_engine::{Coordinator, LockNotification};
use pinward_hardware::ProviderRegistry;
use pinward_hardware::mock::{MOCK_PLATFORM, MockFleet};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keypad lock code coordinator.
#[derive(Parser, Debug)]
#[command(name = "pinward", author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "PINWARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run the coordinator until interrupted (default).
    Run,
    /// Validate the configuration and print the lock layout.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CoordinatorConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => CoordinatorConfig::load_or_default(None),
    };
    init_tracing(&config, cli.verbose);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check => check(&config),
    }
}

fn init_tracing(config: &CoordinatorConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn check(config: &CoordinatorConfig) -> Result<()> {
    config.validate()?;
    println!(
        "{} lock(s), refresh every {}s",
        config.locks.len(),
        config.refresh_interval_secs
    );
    for lock in &config.locks {
        let last_slot = lock.start_slot.saturating_add(lock.slots.saturating_sub(1));
        match &lock.parent {
            Some(parent) => println!(
                "  {} [{}] slots {}-{}, mirrors {}",
                lock.name, lock.platform, lock.start_slot, last_slot, parent
            ),
            None => println!(
                "  {} [{}] slots {}-{}",
                lock.name, lock.platform, lock.start_slot, last_slot
            ),
        }
    }
    Ok(())
}

async fn run(config: CoordinatorConfig) -> Result<()> {
    config.validate()?;

    let fleet = MockFleet::new();
    let mut providers = ProviderRegistry::new();
    providers.register(MOCK_PLATFORM, fleet.factory());

    let mut coordinator = Coordinator::new(&config, providers);
    let ids = coordinator
        .add_configured_locks(&config.locks)
        .await
        .context("failed to register configured locks")?;
    info!("Registered {} lock(s)", ids.len());

    let mut notifications = coordinator.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => log_notification(&notification),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} notification(s)", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    coordinator.run(shutdown_signal()).await;
    logger.abort();
    info!("Shutdown complete");
    Ok(())
}

fn log_notification(notification: &LockNotification) {
    match notification {
        LockNotification::StateChanged {
            lock_name,
            state,
            event_label,
            code_slot_num,
            code_slot_name,
            ..
        } => match code_slot_name {
            Some(slot_name) => info!(
                "{} {} by {} (slot {}): {}",
                lock_name, state, slot_name, code_slot_num, event_label
            ),
            None => info!("{} {}: {}", lock_name, state, event_label),
        },
        LockNotification::DoorChanged {
            lock_name, state, ..
        } => info!("{} door {}", lock_name, state),
        LockNotification::Connection {
            lock_name,
            connected,
            ..
        } => {
            if *connected {
                info!("{} is back online", lock_name);
            } else {
                warn!("{} went offline", lock_name);
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
