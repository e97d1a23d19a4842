// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlation layer: nonce-keyed request/reply over the duplex channel.
//!
//! Every call inserts a oneshot resolver into a waiting map keyed by a
//! freshly drawn nonce, sends the tagged request and suspends on the
//! resolver. A demultiplexer task owns the receive half of the channel
//! and routes each inbound message: replies resolve the matching pending
//! entry, relayed events fan out to subscribers, everything else is
//! dropped at trace level. Nonces only need to be unique among the
//! requests this agent currently has outstanding; the coordinator echoes
//! them back verbatim and never generates its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

use overseer_protocol::{
    AgentChannel, AgentMessage, AgentSender, CoordinatorMessage, RelayedEvent, Reply, Request,
    RequestBody,
};

use crate::error::SdkError;

/// Capacity of the relayed-event fan-out buffer per agent.
const EVENT_BUFFER: usize = 64;

type PendingMap = HashMap<u64, oneshot::Sender<Reply>>;

/// The agent-side correlation layer. One per agent, shared by all
/// proxies through an [`Arc`].
pub struct Mailbox {
    sender: AgentSender,
    /// `None` once the channel is torn down; calls then fail fast.
    pending: Arc<Mutex<Option<PendingMap>>>,
    events: broadcast::Sender<RelayedEvent>,
    demux: JoinHandle<()>,
}

impl Mailbox {
    /// Take ownership of the agent end of the channel and start the
    /// demultiplexer task.
    pub fn start(channel: AgentChannel) -> Self {
        let (sender, mut rx) = channel.into_parts();
        let pending: Arc<Mutex<Option<PendingMap>>> = Arc::new(Mutex::new(Some(HashMap::new())));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let demux_pending = pending.clone();
        let demux_events = events.clone();
        let demux = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    CoordinatorMessage::Reply(reply) => route_reply(&demux_pending, reply),
                    CoordinatorMessage::Event(event) => {
                        // No subscribers is fine; events are best-effort pushes.
                        let _ = demux_events.send(event);
                    }
                }
            }

            // Channel torn down: resolve every outstanding call with an
            // error by dropping its resolver, and refuse future calls.
            if let Some(map) = demux_pending.lock().expect("pending map poisoned").take() {
                trace!(outstanding = map.len(), "coordinator channel closed");
                drop(map);
            }
        });

        Self {
            sender,
            pending,
            events,
            demux,
        }
    }

    /// Send a request and suspend until the reply carrying its nonce
    /// arrives. Fails with [`SdkError::Remote`] when the reply's error
    /// flag is set, [`SdkError::ChannelClosed`] when the coordinator is
    /// gone. No timeout is imposed here.
    pub async fn call(&self, body: RequestBody) -> Result<Value, SdkError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let nonce = {
            let mut guard = self.pending.lock().expect("pending map poisoned");
            let map = guard.as_mut().ok_or(SdkError::ChannelClosed)?;
            let mut nonce = rand::random::<u64>();
            while map.contains_key(&nonce) {
                nonce = rand::random::<u64>();
            }
            map.insert(nonce, reply_tx);
            nonce
        };

        if self
            .sender
            .send(AgentMessage::Request(Request { nonce, body }))
            .is_err()
        {
            self.forget(nonce);
            return Err(SdkError::ChannelClosed);
        }

        let reply = reply_rx.await.map_err(|_| SdkError::ChannelClosed)?;
        if reply.error {
            Err(SdkError::Remote(error_text(reply.result)))
        } else {
            Ok(reply.result)
        }
    }

    /// Subscribe to events relayed by the coordinator.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayedEvent> {
        self.events.subscribe()
    }

    /// A handle for fire-and-forget sends (heartbeats).
    pub fn sender(&self) -> AgentSender {
        self.sender.clone()
    }

    /// Number of requests currently awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.pending
            .lock()
            .expect("pending map poisoned")
            .as_ref()
            .map_or(0, HashMap::len)
    }

    fn forget(&self, nonce: u64) {
        if let Some(map) = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .as_mut()
        {
            map.remove(&nonce);
        }
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

fn route_reply(pending: &Mutex<Option<PendingMap>>, reply: Reply) {
    let Some(nonce) = reply.nonce else {
        // Heartbeat acknowledgement; nobody waits on these.
        trace!(kind = ?reply.kind, "dropping nonce-less reply");
        return;
    };

    let resolver = pending
        .lock()
        .expect("pending map poisoned")
        .as_mut()
        .and_then(|map| map.remove(&nonce));

    match resolver {
        // The caller may have given up (e.g. its task was cancelled);
        // a failed send is not an error.
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => trace!(nonce, "dropping reply with no pending request"),
    }
}

fn error_text(result: Value) -> String {
    match result {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
