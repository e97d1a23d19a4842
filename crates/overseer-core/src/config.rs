// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Overseer coordinator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Redis connection URL
    pub cache_url: String,
    /// Number of agents to keep alive
    pub agents: usize,
    /// Pub/sub channel the event relay subscribes to
    pub relay_channel: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `OVERSEER_DATABASE_URL`: PostgreSQL connection string
    /// - `OVERSEER_CACHE_URL`: Redis connection string
    ///
    /// Optional (with defaults):
    /// - `OVERSEER_AGENTS`: agent pool size (default: available parallelism)
    /// - `OVERSEER_RELAY_CHANNEL`: relay subscription channel (default: `logs`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("OVERSEER_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("OVERSEER_DATABASE_URL"))?;

        let cache_url = std::env::var("OVERSEER_CACHE_URL")
            .map_err(|_| ConfigError::Missing("OVERSEER_CACHE_URL"))?;

        let agents: usize = match std::env::var("OVERSEER_AGENTS") {
            Ok(value) => value
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid(
                    "OVERSEER_AGENTS",
                    "must be a positive integer",
                ))?,
            Err(_) => default_agents(),
        };

        let relay_channel =
            std::env::var("OVERSEER_RELAY_CHANNEL").unwrap_or_else(|_| "logs".to_string());

        Ok(Self {
            database_url,
            cache_url,
            agents,
            relay_channel,
        })
    }
}

fn default_agents() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
