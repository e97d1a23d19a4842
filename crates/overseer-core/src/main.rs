// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer Core - coordinator entry point
//!
//! Wires env configuration, the PostgreSQL pool and the Redis client
//! into a coordinator and runs it until ctrl-c. The stock binary parks
//! its agents on the shutdown signal; an embedding application supplies
//! real agent bodies through [`overseer_core::coordinator::Coordinator`]
//! instead.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use overseer_core::backend::{PostgresBackend, RedisBackend, SqlBackend};
use overseer_core::config::Config;
use overseer_core::coordinator::Coordinator;
use overseer_sdk::agent::{AgentContext, AgentMain};

/// Agent body used by the stock binary: no application logic, just
/// heartbeats until asked to stop.
struct IdleAgent;

#[async_trait]
impl AgentMain for IdleAgent {
    async fn run(&self, mut ctx: AgentContext) -> i32 {
        ctx.wait_shutdown().await;
        0
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("overseer_core=info".parse()?),
        )
        .init();

    info!("Starting Overseer Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        agents = config.agents,
        relay_channel = %config.relay_channel,
        "Configuration loaded"
    );

    // Connect to the database
    info!("Connecting to database...");
    let sql = PostgresBackend::connect(&config.database_url).await?;

    // Verify the connection before spawning anything
    sql.query("SELECT 1", &[]).await?;
    info!("Database health check passed");

    // Connect to the cache service
    info!("Connecting to cache...");
    let cache = RedisBackend::connect(&config.cache_url).await?;
    info!("Cache connection established");

    let coordinator = Coordinator::builder()
        .sql(Arc::new(sql))
        .cache(Arc::new(cache))
        .agent_main(Arc::new(IdleAgent))
        .agents(config.agents)
        .relay_channel(config.relay_channel)
        .build()?
        .start()
        .await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    coordinator.shutdown().await?;
    info!("Shutdown complete");

    Ok(())
}
