//! Environment-driven configuration.

use std::time::Duration;

use anyhow::{Context as _, Result};
use secrecy::SecretString;

/// Which transport the failover sender tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Bus,
    Http,
}

#[derive(Debug)]
pub struct Config {
    /// Wall-clock period between scan cycles.
    pub scan_interval: Duration,
    /// Links per page when walking the store.
    pub page_size: usize,
    /// Bound on concurrently processed links within a batch.
    pub max_in_flight: usize,

    pub database_url: String,

    pub github_api_url: String,
    pub github_token: SecretString,

    pub stackoverflow_api_url: String,
    pub stackoverflow_key: String,
    pub stackoverflow_access_token: SecretString,

    /// Base URL of the bot's ingestion endpoint (direct transport).
    pub bot_url: String,
    /// Base URL of the message-bus REST proxy (bus transport).
    pub bus_proxy_url: String,
    pub message_transport: Transport,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let transport = var_or("MESSAGE_TRANSPORT", "http");
        let message_transport = match transport.to_lowercase().as_str() {
            "kafka" | "bus" => Transport::Bus,
            "http" => Transport::Http,
            other => anyhow::bail!("unknown MESSAGE_TRANSPORT: {other}"),
        };

        Ok(Config {
            scan_interval: Duration::from_secs(parse_var("SCAN_INTERVAL_SECS", 10)?),
            page_size: parse_var("LINKS_PAGE_SIZE", 100)?,
            max_in_flight: parse_var("MAX_IN_FLIGHT_CHECKS", 16)?,
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is missing")?,
            github_api_url: var_or("GITHUB_API_URL", "https://api.github.com"),
            github_token: std::env::var("GITHUB_TOKEN")
                .context("GITHUB_TOKEN is missing")?
                .into(),
            stackoverflow_api_url: var_or(
                "STACKOVERFLOW_API_URL",
                "https://api.stackexchange.com/2.3",
            ),
            stackoverflow_key: std::env::var("STACKOVERFLOW_KEY")
                .context("STACKOVERFLOW_KEY is missing")?,
            stackoverflow_access_token: std::env::var("STACKOVERFLOW_ACCESS_TOKEN")
                .context("STACKOVERFLOW_ACCESS_TOKEN is missing")?
                .into(),
            bot_url: var_or("BOT_URL", "http://localhost:8080"),
            bus_proxy_url: var_or("BUS_PROXY_URL", "http://localhost:8082"),
            message_transport,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("cannot parse {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
