// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message envelopes exchanged between the coordinator and its agents.
//!
//! Upstream (agent → coordinator) traffic is either a fire-and-forget
//! heartbeat or a nonce-tagged request. Downstream (coordinator → agent)
//! traffic is either a reply carrying the nonce of the request it answers
//! or a relayed pub/sub event pushed to every agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent by an agent to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentMessage {
    /// Periodic liveness signal. No reply is awaited by the sender.
    Heartbeat,
    /// A correlated request; the coordinator answers with a [`Reply`]
    /// bearing the same nonce.
    Request(Request),
}

/// A message sent by the coordinator to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoordinatorMessage {
    /// Answer to a previously issued [`Request`], or a nonce-less
    /// heartbeat acknowledgement.
    Reply(Reply),
    /// An externally published event relayed to every live agent.
    /// Agents treat this as a push notification, not a correlated reply.
    Event(RelayedEvent),
}

/// Classification of request/reply traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Database statement or transaction-lease control.
    Sql,
    /// Cache get/set/publish.
    Cache,
    /// Heartbeat traffic (only ever appears on acknowledgements).
    Watchdog,
}

/// A nonce-tagged request issued by an agent-side proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation token. Unique only among the requests the issuing
    /// agent currently has outstanding.
    pub nonce: u64,
    /// The operation to perform.
    pub body: RequestBody,
}

/// The operation carried by a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestBody {
    /// A database operation.
    ///
    /// Field combinations:
    /// - `statement` set, `transaction` empty: single pooled statement.
    /// - both set: statement executed on the transaction's leased
    ///   connection (the lease is created on first use).
    /// - `transaction` set, `statement` empty: release the lease and
    ///   forget the transaction id.
    Sql {
        /// Transaction identifier, if the statement belongs to a lease.
        transaction: Option<u64>,
        /// Statement text; `None` requests a lease release.
        statement: Option<String>,
        /// Positional parameters bound to the statement.
        params: Vec<Value>,
    },
    /// A cache operation.
    Cache(CacheCommand),
}

impl RequestBody {
    /// The kind a reply to this request will carry.
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestBody::Sql { .. } => RequestKind::Sql,
            RequestBody::Cache(_) => RequestKind::Cache,
        }
    }
}

/// Cache actions. Values cross the channel pre-serialized to JSON text,
/// so the coordinator stores and returns them without interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheCommand {
    /// Fetch the value stored under `key`.
    Get {
        /// Cache key.
        key: String,
    },
    /// Store `value` under `key`, optionally expiring it.
    Set {
        /// Cache key.
        key: String,
        /// Serialized value.
        value: String,
        /// Time to live in milliseconds; floored to whole seconds by the
        /// coordinator before it instructs the cache. `None` stores the
        /// key without expiry.
        ttl_ms: Option<u64>,
    },
    /// Publish `value` on a pub/sub channel.
    Publish {
        /// Pub/sub channel name.
        channel: String,
        /// Serialized value.
        value: String,
    },
}

/// The reply envelope. The result is opaque at this layer; the proxy
/// that issued the matching request interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Nonce of the request this reply answers. `None` on heartbeat
    /// acknowledgements, which no caller waits for.
    pub nonce: Option<u64>,
    /// Kind of the request this reply answers.
    pub kind: RequestKind,
    /// Set when the coordinator's operation failed; `result` then holds
    /// the error message text and nothing else.
    pub error: bool,
    /// Operation result, or the error message when `error` is set.
    pub result: Value,
}

impl Reply {
    /// Build a success reply to `nonce`.
    pub fn ok(nonce: u64, kind: RequestKind, result: Value) -> Self {
        Self {
            nonce: Some(nonce),
            kind,
            error: false,
            result,
        }
    }

    /// Build an error reply to `nonce` carrying `message` as its result.
    pub fn err(nonce: u64, kind: RequestKind, message: String) -> Self {
        Self {
            nonce: Some(nonce),
            kind,
            error: true,
            result: Value::String(message),
        }
    }

    /// Build a heartbeat acknowledgement. Carries no nonce; agents drop
    /// it without resolving any pending call.
    pub fn heartbeat_ack() -> Self {
        Self {
            nonce: None,
            kind: RequestKind::Watchdog,
            error: false,
            result: Value::Null,
        }
    }
}

/// An externally published event forwarded verbatim to every agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedEvent {
    /// The pub/sub channel the event arrived on.
    pub channel: String,
    /// The parsed event payload.
    pub data: Value,
}
