// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test doubles and harnesses for the coordinator integration
//! tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use overseer_core::backend::{CacheBackend, SqlBackend, SqlLease};
use overseer_core::dispatch::{DispatchState, run_dispatcher};
use overseer_core::error::CoreError;
use overseer_core::transactions::TransactionTable;
use overseer_core::watchdog::{AgentId, AgentRegistry};
use overseer_protocol::RelayedEvent;
use overseer_protocol::channel::duplex;
use overseer_sdk::agent::{AgentContext, AgentMain};
use overseer_sdk::{Cache, Database, Mailbox};

// ============================================================================
// Database double
// ============================================================================

/// Scripted database backend.
///
/// Statement conventions:
/// - `delay:<ms> <text>`: sleep before answering, then behave as `<text>`
/// - anything containing `fail`: reply with a synthetic error
/// - everything else: echo `[{"statement": <text>}]`
///
/// Lease-path statements are recorded with their lease number so tests
/// can assert `BEGIN`/statement/`COMMIT` ordering per connection.
pub struct RecordingSql {
    statements: Arc<StdMutex<Vec<(Option<usize>, String)>>>,
    live_leases: Arc<AtomicUsize>,
    leases_opened: Arc<AtomicUsize>,
}

impl RecordingSql {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            statements: Arc::new(StdMutex::new(Vec::new())),
            live_leases: Arc::new(AtomicUsize::new(0)),
            leases_opened: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Every statement seen, pool and lease paths alike, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Statements that ran on a lease, with the lease number.
    pub fn lease_statements(&self) -> Vec<(usize, String)> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(lease, s)| lease.map(|l| (l, s.clone())))
            .collect()
    }

    /// Connections currently checked out.
    pub fn live_leases(&self) -> usize {
        self.live_leases.load(Ordering::SeqCst)
    }

    /// Connections checked out over the backend's lifetime.
    pub fn leases_opened(&self) -> usize {
        self.leases_opened.load(Ordering::SeqCst)
    }
}

async fn run_scripted(statement: &str) -> Result<Vec<Value>, CoreError> {
    let mut effective = statement;
    if let Some(rest) = statement.strip_prefix("delay:") {
        let (ms, text) = rest.split_once(' ').unwrap_or(("0", rest));
        tokio::time::sleep(Duration::from_millis(ms.parse().unwrap_or(0))).await;
        effective = text;
    }
    if effective.contains("fail") {
        return Err(CoreError::Database("synthetic failure".to_string()));
    }
    Ok(vec![json!({"statement": effective})])
}

#[async_trait]
impl SqlBackend for RecordingSql {
    async fn query(&self, statement: &str, _params: &[Value]) -> Result<Vec<Value>, CoreError> {
        let result = run_scripted(statement).await;
        self.statements
            .lock()
            .unwrap()
            .push((None, statement.to_string()));
        result
    }

    async fn lease(&self) -> Result<Box<dyn SqlLease>, CoreError> {
        // A small checkout delay widens the double-acquire race window.
        tokio::time::sleep(Duration::from_millis(2)).await;
        let lease = self.leases_opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_leases.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingLease {
            lease,
            statements: self.statements.clone(),
            live: self.live_leases.clone(),
        }))
    }
}

pub struct RecordingLease {
    lease: usize,
    statements: Arc<StdMutex<Vec<(Option<usize>, String)>>>,
    live: Arc<AtomicUsize>,
}

impl Drop for RecordingLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SqlLease for RecordingLease {
    async fn query(&mut self, statement: &str, _params: &[Value]) -> Result<Vec<Value>, CoreError> {
        let result = run_scripted(statement).await;
        self.statements
            .lock()
            .unwrap()
            .push((Some(self.lease), statement.to_string()));
        result
    }
}

// ============================================================================
// Cache double
// ============================================================================

/// In-memory cache with TTLs on the tokio clock (so paused-clock tests
/// control expiry) and loopback pub/sub.
pub struct MemoryCache {
    entries: StdMutex<HashMap<String, (String, Option<Instant>)>>,
    subscribers: StdMutex<HashMap<String, Vec<mpsc::Sender<String>>>>,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: StdMutex::new(HashMap::new()),
            subscribers: StdMutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, Some(expires_at))) if Instant::now() >= *expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), None));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), CoreError> {
        let expires_at = Instant::now() + Duration::from_secs(seconds);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Some(expires_at)));
        Ok(())
    }

    async fn publish(&self, channel: &str, value: &str) -> Result<i64, CoreError> {
        let senders = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers.get(channel).cloned().unwrap_or_default()
        };
        let mut delivered = 0;
        for sender in senders {
            if sender.send(value.to_string()).await.is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, CoreError> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribers
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

// ============================================================================
// Direct dispatcher harness
// ============================================================================

/// One agent channel served by a dispatcher, with the SDK mailbox on
/// the other end. No supervision, no relay; for proxy/dispatch tests.
pub struct DispatchHarness {
    pub mailbox: Arc<Mailbox>,
    pub db: Database,
    pub cache: Cache,
    pub state: Arc<DispatchState>,
    pub dispatcher: tokio::task::JoinHandle<()>,
}

pub fn dispatch_harness(
    sql: Arc<dyn SqlBackend>,
    cache: Arc<dyn CacheBackend>,
) -> DispatchHarness {
    let state = Arc::new(DispatchState {
        sql,
        cache,
        transactions: Arc::new(TransactionTable::new()),
        registry: Arc::new(AgentRegistry::new()),
    });
    let (coordinator_channel, agent_channel) = duplex();
    let dispatcher = tokio::spawn(run_dispatcher(
        AgentId::from(1),
        coordinator_channel,
        state.clone(),
    ));
    let mailbox = Arc::new(Mailbox::start(agent_channel));
    DispatchHarness {
        db: Database::new(mailbox.clone()),
        cache: Cache::new(mailbox.clone()),
        mailbox,
        state,
        dispatcher,
    }
}

// ============================================================================
// Test agents
// ============================================================================

/// Handles an [`ExportAgent`] smuggles out of its context so the test
/// can drive agent-side proxies from outside.
pub struct AgentHandles {
    pub db: Database,
    pub cache: Cache,
    pub events: broadcast::Receiver<RelayedEvent>,
    pub shutdown: watch::Receiver<bool>,
}

/// Ships its handles to the test, then parks until shutdown.
pub struct ExportAgent {
    pub handles_tx: mpsc::UnboundedSender<AgentHandles>,
}

#[async_trait]
impl AgentMain for ExportAgent {
    async fn run(&self, mut ctx: AgentContext) -> i32 {
        let _ = self.handles_tx.send(AgentHandles {
            db: ctx.db().clone(),
            cache: ctx.cache().clone(),
            events: ctx.events(),
            shutdown: ctx.shutdown(),
        });
        ctx.wait_shutdown().await;
        0
    }
}

/// Counts spawns and either honors the graceful-terminate signal or
/// ignores everything until killed.
pub struct StallingAgent {
    pub spawns: Arc<AtomicUsize>,
    pub respond_to_shutdown: bool,
}

#[async_trait]
impl AgentMain for StallingAgent {
    async fn run(&self, mut ctx: AgentContext) -> i32 {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        if self.respond_to_shutdown {
            ctx.wait_shutdown().await;
            0
        } else {
            std::future::pending().await
        }
    }
}

/// Exits immediately on its first run (with the given code), then parks
/// on every respawn. Lets tests observe exactly one exit → respawn
/// cycle without churning.
pub struct ExitOnceAgent {
    pub spawns: Arc<AtomicUsize>,
    pub exit_code: i32,
}

#[async_trait]
impl AgentMain for ExitOnceAgent {
    async fn run(&self, mut ctx: AgentContext) -> i32 {
        if self.spawns.fetch_add(1, Ordering::SeqCst) == 0 {
            return self.exit_code;
        }
        ctx.wait_shutdown().await;
        0
    }
}
