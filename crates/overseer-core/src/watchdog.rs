// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent registry and the watchdog supervisor.
//!
//! The registry is the coordinator's view of its agents: heartbeat
//! timestamps, health state, the downstream channel handle and the
//! levers for terminating a stuck agent. The watchdog loop sweeps it on
//! a fixed tick and escalates per agent:
//!
//! - 10 s without a heartbeat: log a warning, touch nothing.
//! - 20 s: ask nicely, once, by flipping the agent's shutdown signal.
//! - 30 s: abort the agent's task.
//!
//! Escalation is an explicit state machine (`Healthy → Warned →
//! Terminating → Killed`), transitioned on threshold crossings rather
//! than recomputed from raw offsets, so a delayed tick cannot skip a
//! stage's side effect. A heartbeat resets the agent to `Healthy`.
//! Respawning is not handled here; the coordinator watches agent exits
//! and replaces every agent unconditionally.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use overseer_protocol::{CoordinatorMessage, CoordinatorSender, RelayedEvent};

/// Heartbeat age at which an agent is warned about.
pub const WARN_AFTER: Duration = Duration::from_secs(10);
/// Heartbeat age at which an agent is asked to terminate.
pub const TERMINATE_AFTER: Duration = Duration::from_secs(20);
/// Heartbeat age at which an agent is killed.
pub const KILL_AFTER: Duration = Duration::from_secs(30);

/// Identifier of one supervised agent. Ids are never reused within a
/// coordinator's lifetime; respawns get fresh ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub(crate) u32);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Escalation state of one agent, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthState {
    /// Heartbeats arriving on time.
    Healthy,
    /// Overdue; a warning has been logged.
    Warned,
    /// Graceful termination has been requested.
    Terminating,
    /// The agent's task has been aborted.
    Killed,
}

pub(crate) struct AgentEntry {
    pub(crate) spawned_at: Instant,
    pub(crate) last_heartbeat: Instant,
    pub(crate) health: HealthState,
    pub(crate) downstream: CoordinatorSender,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) abort: AbortHandle,
}

/// Point-in-time view of one agent, for operational visibility.
#[derive(Debug, Clone)]
pub struct AgentHealth {
    /// The agent's identifier.
    pub id: AgentId,
    /// Current escalation state.
    pub health: HealthState,
    /// Time since the last heartbeat.
    pub heartbeat_age: Duration,
    /// Time since the agent was spawned.
    pub uptime: Duration,
}

/// The coordinator's table of live agents.
#[derive(Default)]
pub struct AgentRegistry {
    agents: StdMutex<HashMap<AgentId, AgentEntry>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: AgentId, entry: AgentEntry) {
        self.agents
            .lock()
            .expect("agent registry poisoned")
            .insert(id, entry);
    }

    pub(crate) fn remove(&self, id: AgentId) -> bool {
        self.agents
            .lock()
            .expect("agent registry poisoned")
            .remove(&id)
            .is_some()
    }

    /// Record a heartbeat. Only ever called by the dispatcher upon a
    /// heartbeat message; an exited agent's beat is silently ignored.
    pub(crate) fn beat(&self, id: AgentId) {
        if let Some(entry) = self
            .agents
            .lock()
            .expect("agent registry poisoned")
            .get_mut(&id)
        {
            entry.last_heartbeat = Instant::now();
            entry.health = HealthState::Healthy;
        }
    }

    /// Forward a relayed event to every live agent. Returns how many
    /// agents it was delivered to.
    pub(crate) fn broadcast(&self, event: &RelayedEvent) -> usize {
        let agents = self.agents.lock().expect("agent registry poisoned");
        let mut delivered = 0;
        for entry in agents.values() {
            if entry
                .downstream
                .send(CoordinatorMessage::Event(event.clone()))
                .is_ok()
            {
                delivered += 1;
            }
        }
        delivered
    }

    /// Request graceful termination of every agent (coordinator
    /// shutdown).
    pub(crate) fn signal_shutdown_all(&self) {
        let agents = self.agents.lock().expect("agent registry poisoned");
        for entry in agents.values() {
            let _ = entry.shutdown.send(true);
        }
    }

    /// One watchdog pass over all agents.
    pub(crate) fn sweep(&self) {
        let now = Instant::now();
        let mut agents = self.agents.lock().expect("agent registry poisoned");
        for (id, entry) in agents.iter_mut() {
            let age = now.saturating_duration_since(entry.last_heartbeat);

            if age > KILL_AFTER && entry.health < HealthState::Killed {
                error!(agent = %id, "agent hasn't sent a heartbeat in 30s, killing");
                entry.abort.abort();
                entry.health = HealthState::Killed;
            } else if age > TERMINATE_AFTER && entry.health < HealthState::Terminating {
                error!(agent = %id, "agent hasn't sent a heartbeat in 20s, terminating");
                let _ = entry.shutdown.send(true);
                entry.health = HealthState::Terminating;
            } else if age > WARN_AFTER && entry.health < HealthState::Warned {
                warn!(agent = %id, "agent hasn't sent a heartbeat in 10s");
                entry.health = HealthState::Warned;
            }
        }
    }

    /// Snapshot of every live agent's health.
    pub fn snapshot(&self) -> Vec<AgentHealth> {
        let now = Instant::now();
        let agents = self.agents.lock().expect("agent registry poisoned");
        let mut snapshot: Vec<_> = agents
            .iter()
            .map(|(id, entry)| AgentHealth {
                id: *id,
                health: entry.health,
                heartbeat_age: now.saturating_duration_since(entry.last_heartbeat),
                uptime: now.saturating_duration_since(entry.spawned_at),
            })
            .collect();
        snapshot.sort_by_key(|health| health.id);
        snapshot
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.agents.lock().expect("agent registry poisoned").len()
    }

    /// Whether no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drive the registry sweep on a fixed tick until shutdown.
pub(crate) async fn run_watchdog(
    registry: std::sync::Arc<AgentRegistry>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown too.
                if changed.is_err() || *shutdown.borrow() {
                    debug!("watchdog stopping");
                    break;
                }
            }

            _ = interval.tick() => {
                registry.sweep();
            }
        }
    }
}
