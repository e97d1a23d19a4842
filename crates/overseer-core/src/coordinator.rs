// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The embeddable coordinator runtime.
//!
//! [`Coordinator::builder`] wires the backends and the agent entry
//! point together; [`CoordinatorConfig::start`] spawns the agent pool,
//! the watchdog loop and the event relay. Every agent gets its own
//! duplex channel, dispatcher task and supervision task; when an agent
//! exits, for any reason and with any exit code, its registry entry is
//! deleted and a replacement is spawned unconditionally.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use overseer_core::coordinator::Coordinator;
//! use overseer_core::backend::{PostgresBackend, RedisBackend};
//!
//! let coordinator = Coordinator::builder()
//!     .sql(Arc::new(PostgresBackend::connect(&db_url).await?))
//!     .cache(Arc::new(RedisBackend::connect(&cache_url).await?))
//!     .agent_main(Arc::new(MyAgent))
//!     .agents(8)
//!     .build()?
//!     .start()
//!     .await?;
//!
//! // ... run ...
//!
//! coordinator.shutdown().await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use overseer_protocol::channel::duplex;
use overseer_sdk::agent::{AgentMain, run_agent};

use crate::backend::{CacheBackend, SqlBackend};
use crate::dispatch::{DispatchState, run_dispatcher};
use crate::relay::run_relay;
use crate::transactions::TransactionTable;
use crate::watchdog::{AgentEntry, AgentId, AgentRegistry, HealthState, run_watchdog};

/// Default watchdog sweep period.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Builder for a [`Coordinator`].
pub struct CoordinatorBuilder {
    sql: Option<Arc<dyn SqlBackend>>,
    cache: Option<Arc<dyn CacheBackend>>,
    agent_main: Option<Arc<dyn AgentMain>>,
    agents: usize,
    relay_channel: String,
    watchdog_tick: Duration,
    heartbeat_interval: Duration,
}

impl std::fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("sql", &self.sql.as_ref().map(|_| "..."))
            .field("cache", &self.cache.as_ref().map(|_| "..."))
            .field("agent_main", &self.agent_main.as_ref().map(|_| "..."))
            .field("agents", &self.agents)
            .field("relay_channel", &self.relay_channel)
            .finish()
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            sql: None,
            cache: None,
            agent_main: None,
            agents: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(4),
            relay_channel: "logs".to_string(),
            watchdog_tick: WATCHDOG_TICK,
            heartbeat_interval: overseer_sdk::agent::HEARTBEAT_INTERVAL,
        }
    }
}

impl CoordinatorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database backend (required).
    pub fn sql(mut self, sql: Arc<dyn SqlBackend>) -> Self {
        self.sql = Some(sql);
        self
    }

    /// Set the cache backend (required).
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the application entry point run inside every agent
    /// (required).
    pub fn agent_main(mut self, main: Arc<dyn AgentMain>) -> Self {
        self.agent_main = Some(main);
        self
    }

    /// Set the agent pool size.
    ///
    /// Default: available parallelism.
    pub fn agents(mut self, agents: usize) -> Self {
        self.agents = agents;
        self
    }

    /// Set the pub/sub channel the event relay subscribes to.
    ///
    /// Default: `logs`.
    pub fn relay_channel(mut self, channel: impl Into<String>) -> Self {
        self.relay_channel = channel.into();
        self
    }

    /// Override the watchdog sweep period. Intended for tests.
    pub fn watchdog_tick(mut self, tick: Duration) -> Self {
        self.watchdog_tick = tick;
        self
    }

    /// Override the agents' heartbeat period. Zero disables heartbeats
    /// entirely, which the supervision tests use to simulate stalled
    /// agents.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Build the coordinator configuration.
    ///
    /// Returns an error if a required field is missing.
    pub fn build(self) -> Result<CoordinatorConfig> {
        let sql = self.sql.ok_or_else(|| anyhow::anyhow!("sql backend is required"))?;
        let cache = self
            .cache
            .ok_or_else(|| anyhow::anyhow!("cache backend is required"))?;
        let agent_main = self
            .agent_main
            .ok_or_else(|| anyhow::anyhow!("agent_main is required"))?;

        Ok(CoordinatorConfig {
            sql,
            cache,
            agent_main,
            agents: self.agents,
            relay_channel: self.relay_channel,
            watchdog_tick: self.watchdog_tick,
            heartbeat_interval: self.heartbeat_interval,
        })
    }
}

/// A validated coordinator configuration, ready to start.
pub struct CoordinatorConfig {
    sql: Arc<dyn SqlBackend>,
    cache: Arc<dyn CacheBackend>,
    agent_main: Arc<dyn AgentMain>,
    agents: usize,
    relay_channel: String,
    watchdog_tick: Duration,
    heartbeat_interval: Duration,
}

impl CoordinatorConfig {
    /// Spawn the agent pool, the watchdog loop and the event relay.
    pub async fn start(self) -> Result<Coordinator> {
        let registry = Arc::new(AgentRegistry::new());
        let dispatch = Arc::new(DispatchState {
            sql: self.sql,
            cache: self.cache.clone(),
            transactions: Arc::new(TransactionTable::new()),
            registry: registry.clone(),
        });

        let inner = Arc::new(CoordinatorInner {
            dispatch,
            agent_main: self.agent_main,
            heartbeat_interval: self.heartbeat_interval,
            next_agent_id: AtomicU32::new(1),
            shutting_down: AtomicBool::new(false),
        });

        info!(count = self.agents, "spawning agents");
        for _ in 0..self.agents {
            spawn_agent(&inner);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let watchdog = tokio::spawn(run_watchdog(
            registry.clone(),
            self.watchdog_tick,
            shutdown_rx,
        ));

        let relay_cache = self.cache;
        let relay_channel = self.relay_channel;
        let relay = tokio::spawn(async move {
            if let Err(e) = run_relay(relay_cache, relay_channel, registry).await {
                error!(error = %e, "event relay failed");
            }
        });

        info!("coordinator started");

        Ok(Coordinator {
            inner,
            watchdog,
            relay,
            shutdown_tx,
        })
    }
}

struct CoordinatorInner {
    dispatch: Arc<DispatchState>,
    agent_main: Arc<dyn AgentMain>,
    heartbeat_interval: Duration,
    next_agent_id: AtomicU32,
    shutting_down: AtomicBool,
}

/// A running coordinator: exclusive owner of the database pool and the
/// cache connection, supervisor of the agent pool.
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
    watchdog: JoinHandle<()>,
    relay: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Coordinator {
    /// Create a builder for configuring a coordinator.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// The agent table, for health snapshots.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.inner.dispatch.registry
    }

    /// Number of currently live agents.
    pub fn agent_count(&self) -> usize {
        self.inner.dispatch.registry.len()
    }

    /// The live-transaction table, for observability.
    pub fn transactions(&self) -> &Arc<TransactionTable> {
        &self.inner.dispatch.transactions
    }

    /// Gracefully shut down: stop respawning, ask every agent to wind
    /// down, and stop the watchdog and relay loops.
    pub async fn shutdown(self) -> Result<()> {
        info!("coordinator shutting down");
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.dispatch.registry.signal_shutdown_all();
        let _ = self.shutdown_tx.send(true);
        self.relay.abort();
        if let Err(e) = self.watchdog.await {
            if !e.is_cancelled() {
                error!(error = %e, "watchdog task failed during shutdown");
            }
        }
        info!("coordinator shutdown complete");
        Ok(())
    }
}

/// Spawn one agent: its duplex channel, its dispatcher, the agent task
/// itself, and the supervision task that respawns it on exit.
fn spawn_agent(inner: &Arc<CoordinatorInner>) -> AgentId {
    let id = AgentId(inner.next_agent_id.fetch_add(1, Ordering::SeqCst));
    let (coordinator_channel, agent_channel) = duplex();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let downstream = coordinator_channel.sender();

    let agent_task = tokio::spawn(run_agent(
        agent_channel,
        shutdown_rx,
        inner.heartbeat_interval,
        inner.agent_main.clone(),
    ));
    let dispatcher = tokio::spawn(run_dispatcher(
        id,
        coordinator_channel,
        inner.dispatch.clone(),
    ));

    let now = Instant::now();
    inner.dispatch.registry.insert(
        id,
        AgentEntry {
            spawned_at: now,
            last_heartbeat: now,
            health: HealthState::Healthy,
            downstream,
            shutdown: shutdown_tx,
            abort: agent_task.abort_handle(),
        },
    );
    info!(agent = %id, "agent spawned");

    tokio::spawn(supervise(inner.clone(), id, agent_task, dispatcher));
    id
}

/// Wait for one agent to exit, log how it went, and replace it. There
/// is deliberately no backoff and no crash-loop detection: every exit
/// triggers exactly one respawn unless the coordinator itself is
/// shutting down.
async fn supervise(
    inner: Arc<CoordinatorInner>,
    id: AgentId,
    agent_task: JoinHandle<i32>,
    dispatcher: JoinHandle<()>,
) {
    let outcome = agent_task.await;
    inner.dispatch.registry.remove(id);
    dispatcher.abort();

    match outcome {
        Ok(0) => warn!(agent = %id, "agent exited with code 0"),
        Ok(code) => error!(agent = %id, code, "agent exited"),
        Err(e) if e.is_cancelled() => error!(agent = %id, "agent killed"),
        Err(_) => error!(agent = %id, "agent panicked"),
    }

    if !inner.shutting_down.load(Ordering::SeqCst) {
        spawn_agent(&inner);
    }
}
