// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent bootstrap: wires the mailbox, the heartbeat loop and the
//! application entry point together.
//!
//! The coordinator calls [`run_agent`] for every agent it spawns (and
//! respawns). The bootstrap owns the plumbing; application code only
//! sees an [`AgentContext`] with the database, cache and event handles
//! plus the graceful-shutdown signal the watchdog flips when the agent
//! stops heartbeating.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use overseer_protocol::{AgentChannel, AgentMessage, AgentSender, RelayedEvent};

use crate::cache::Cache;
use crate::db::Database;
use crate::mailbox::Mailbox;

/// Default period between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// The application entry point run inside every agent. The returned
/// value is the agent's exit code: zero for a clean exit, anything else
/// is logged as an error by the supervisor. Both trigger a respawn.
#[async_trait]
pub trait AgentMain: Send + Sync + 'static {
    /// Run the agent until it decides to exit.
    async fn run(&self, ctx: AgentContext) -> i32;
}

/// Everything an agent's application code gets to touch.
pub struct AgentContext {
    db: Database,
    cache: Cache,
    mailbox: Arc<Mailbox>,
    shutdown: watch::Receiver<bool>,
}

impl AgentContext {
    /// Database access through the coordinator.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Cache access through the coordinator.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Subscribe to events the coordinator relays from the external
    /// pub/sub channel.
    pub fn events(&self) -> broadcast::Receiver<RelayedEvent> {
        self.mailbox.subscribe()
    }

    /// The graceful-terminate signal. Flips to `true` when the watchdog
    /// asks this agent to wind down.
    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Suspend until graceful termination is requested (or the
    /// coordinator is gone, which amounts to the same thing).
    pub async fn wait_shutdown(&mut self) {
        if *self.shutdown.borrow() {
            return;
        }
        while self.shutdown.changed().await.is_ok() {
            if *self.shutdown.borrow() {
                return;
            }
        }
    }
}

/// Run one agent: start the mailbox and heartbeat loop, hand the
/// context to `main`, and return its exit code once it finishes.
///
/// A zero `heartbeat_interval` disables the heartbeat loop; the
/// supervision tests use this to simulate a stalled agent.
pub async fn run_agent(
    channel: AgentChannel,
    shutdown: watch::Receiver<bool>,
    heartbeat_interval: Duration,
    main: Arc<dyn AgentMain>,
) -> i32 {
    let sender = channel.sender();
    let mailbox = Arc::new(Mailbox::start(channel));

    let heartbeat = if heartbeat_interval.is_zero() {
        None
    } else {
        Some(tokio::spawn(heartbeat_loop(sender, heartbeat_interval)))
    };

    let ctx = AgentContext {
        db: Database::new(mailbox.clone()),
        cache: Cache::new(mailbox.clone()),
        mailbox,
        shutdown,
    };

    let code = main.run(ctx).await;
    if let Some(handle) = heartbeat {
        handle.abort();
    }
    debug!(code, "agent main returned");
    code
}

/// Fire-and-forget liveness signals on a fixed period. No reply is
/// awaited; the coordinator's acknowledgements are dropped by the
/// mailbox demultiplexer.
async fn heartbeat_loop(sender: AgentSender, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if sender.send(AgentMessage::Heartbeat).is_err() {
            break;
        }
    }
}
