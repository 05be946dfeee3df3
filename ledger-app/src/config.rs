//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use ledger_hex::{RetryPolicy, ServiceSettings};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("Unknown LOG_FORMAT '{}', expected pretty or json", other),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub retry: RetryPolicy,
    pub publish_retry: RetryPolicy,
    pub lock_timeout: Duration,
    pub settings: ServiceSettings,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, so tests never touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let retries: u32 = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3)?;
        let base_delay_ms: u64 = parse_or(&lookup, "RETRY_BASE_DELAY_MS", 2_000)?;
        let delivery = RetryPolicy::delivery();
        let publish_retries: u32 =
            parse_or(&lookup, "PUBLISH_RETRY_MAX_ATTEMPTS", delivery.max_retries())?;
        let publish_delay_ms: u64 = parse_or(
            &lookup,
            "PUBLISH_RETRY_BASE_DELAY_MS",
            delivery.delay_for(0).as_millis() as u64,
        )?;
        let lock_timeout_ms: u64 = parse_or(&lookup, "LOCK_TIMEOUT_MS", 5_000)?;
        let attempt_timeout_ms: u64 = parse_or(&lookup, "ATTEMPT_TIMEOUT_MS", 30_000)?;
        let batch_limit: usize = parse_or(&lookup, "BATCH_LIMIT", 100)?;
        let log_format = parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?;

        if batch_limit == 0 {
            anyhow::bail!("BATCH_LIMIT must be at least 1");
        }

        Ok(Self {
            database_url,
            retry: RetryPolicy::new()
                .with_max_retries(retries)
                .with_base_delay(Duration::from_millis(base_delay_ms)),
            publish_retry: delivery
                .with_max_retries(publish_retries)
                .with_base_delay(Duration::from_millis(publish_delay_ms)),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            settings: ServiceSettings {
                batch_limit,
                attempt_timeout: Duration::from_millis(attempt_timeout_ms),
                ..ServiceSettings::default()
            },
            log_format,
        })
    }
}

fn parse_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        _ => Ok(default),
    }
}
