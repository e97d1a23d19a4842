// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer Protocol - message envelopes and the coordinator/agent transport
//!
//! This crate defines the traffic that flows between the privileged
//! coordinator process and its pool of agents:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    overseer-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelopes: Request / Reply / Heartbeat / RelayedEvent      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: ordered, reliable in-memory duplex channel      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport is a pair of unbounded [`tokio::sync::mpsc`] channels
//! glued into one duplex link per agent. It delivers messages in send
//! order, exactly once, and knows nothing about request/reply framing;
//! correlation is layered on top by `overseer-sdk` using the `nonce`
//! field of [`Request`] and [`Reply`].
//!
//! # Usage
//!
//! ```ignore
//! use overseer_protocol::channel;
//!
//! let (coordinator, agent) = channel::duplex();
//! // coordinator end receives AgentMessage, sends CoordinatorMessage;
//! // the agent end is the mirror image.
//! ```

pub mod channel;
pub mod message;

pub use channel::{
    AgentChannel, AgentSender, ChannelClosed, CoordinatorChannel, CoordinatorSender, duplex,
};
pub use message::{
    AgentMessage, CacheCommand, CoordinatorMessage, RelayedEvent, Reply, Request, RequestBody,
    RequestKind,
};
