// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The in-memory duplex transport between the coordinator and one agent.
//!
//! Built from two unbounded mpsc channels. Delivery is in send order and
//! exactly once per direction; there is no framing and no request/reply
//! awareness. Dropping either end closes the link for the peer.

use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::message::{AgentMessage, CoordinatorMessage};

/// The peer's end of the channel is gone; the message was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Create one coordinator/agent duplex link.
pub fn duplex() -> (CoordinatorChannel, AgentChannel) {
    let (up_tx, up_rx) = unbounded_channel();
    let (down_tx, down_rx) = unbounded_channel();
    (
        CoordinatorChannel {
            tx: down_tx,
            rx: up_rx,
        },
        AgentChannel {
            tx: up_tx,
            rx: down_rx,
        },
    )
}

/// Cloneable sending half of the coordinator end.
#[derive(Debug, Clone)]
pub struct CoordinatorSender {
    tx: UnboundedSender<CoordinatorMessage>,
}

impl CoordinatorSender {
    /// Send a message downstream to the agent.
    pub fn send(&self, message: CoordinatorMessage) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    /// Whether the agent end is still attached.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Cloneable sending half of the agent end.
#[derive(Debug, Clone)]
pub struct AgentSender {
    tx: UnboundedSender<AgentMessage>,
}

impl AgentSender {
    /// Send a message upstream to the coordinator.
    pub fn send(&self, message: AgentMessage) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    /// Whether the coordinator end is still attached.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The coordinator's end of one agent link.
#[derive(Debug)]
pub struct CoordinatorChannel {
    tx: UnboundedSender<CoordinatorMessage>,
    rx: UnboundedReceiver<AgentMessage>,
}

impl CoordinatorChannel {
    /// Clone a handle for sending downstream.
    pub fn sender(&self) -> CoordinatorSender {
        CoordinatorSender {
            tx: self.tx.clone(),
        }
    }

    /// Send a message downstream to the agent.
    pub fn send(&self, message: CoordinatorMessage) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    /// Receive the next upstream message, or `None` once the agent end
    /// is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<AgentMessage> {
        self.rx.recv().await
    }

    /// Split into the sending handle and the raw receiver.
    pub fn into_parts(self) -> (CoordinatorSender, UnboundedReceiver<AgentMessage>) {
        (CoordinatorSender { tx: self.tx }, self.rx)
    }
}

/// The agent's end of its coordinator link.
#[derive(Debug)]
pub struct AgentChannel {
    tx: UnboundedSender<AgentMessage>,
    rx: UnboundedReceiver<CoordinatorMessage>,
}

impl AgentChannel {
    /// Clone a handle for sending upstream.
    pub fn sender(&self) -> AgentSender {
        AgentSender {
            tx: self.tx.clone(),
        }
    }

    /// Send a message upstream to the coordinator.
    pub fn send(&self, message: AgentMessage) -> Result<(), ChannelClosed> {
        self.tx.send(message).map_err(|_| ChannelClosed)
    }

    /// Receive the next downstream message, or `None` once the
    /// coordinator end is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<CoordinatorMessage> {
        self.rx.recv().await
    }

    /// Split into the sending handle and the raw receiver.
    pub fn into_parts(self) -> (AgentSender, UnboundedReceiver<CoordinatorMessage>) {
        (AgentSender { tx: self.tx }, self.rx)
    }
}
