//! # Ledger Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize logging
//! - Build the store adapter selected by `DATABASE_URL`
//! - Create the ledger service and run one command

mod cli;
mod config;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_hex::{LedgerService, LogPublisher, RetryingPublisher};
use ledger_repo::{Backend, MemoryStore};
use ledger_types::LedgerStore;

use crate::cli::{Cli, Commands};
use crate::config::{Config, LogFormat};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ledger_app=debug,ledger_hex=debug".into());

    // stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run<S: LedgerStore>(
    store: S,
    config: &Config,
    command: Commands,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let publisher = RetryingPublisher::new(LogPublisher, config.publish_retry);
    let service = LedgerService::with_policy(store, publisher, config.retry, config.settings);

    let output = cli::execute(&service, command, cancel).await?;
    println!("{}", output);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let backend = Backend::from_url(&config.database_url).ok_or_else(|| {
        anyhow::anyhow!(
            "Unsupported DATABASE_URL '{}': expected memory, sqlite:// or postgres://",
            config.database_url
        )
    })?;
    tracing::info!(?backend, "Using database backend");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight work");
            on_signal.cancel();
        }
    });

    match backend {
        Backend::Memory => {
            let store = MemoryStore::with_lock_timeout(config.lock_timeout);
            run(store, &config, cli.command, &cancel).await
        }
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            let store =
                ledger_repo::SqliteStore::with_lock_timeout(&config.database_url, config.lock_timeout)
                    .await?;
            run(store, &config, cli.command, &cancel).await
        }
        #[cfg(feature = "postgres")]
        Backend::Postgres => {
            let store = ledger_repo::PostgresStore::with_lock_timeout(
                &config.database_url,
                config.lock_timeout,
            )
            .await?;
            run(store, &config, cli.command, &cancel).await
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!(
            "{:?} backend is not compiled in; rebuild with the matching feature",
            other
        ),
    }
}
