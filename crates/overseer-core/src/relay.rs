// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event relay: one external pub/sub subscription, fanned out to every
//! live agent.
//!
//! Payloads must parse as JSON; anything else is logged and dropped.
//! Agents that exited have no registry entry and receive nothing.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use overseer_protocol::RelayedEvent;

use crate::backend::CacheBackend;
use crate::error::CoreError;
use crate::watchdog::AgentRegistry;

/// Subscribe once and forward every event until the subscription ends.
pub async fn run_relay(
    cache: Arc<dyn CacheBackend>,
    channel: String,
    registry: Arc<AgentRegistry>,
) -> Result<(), CoreError> {
    let mut subscription = cache.subscribe(&channel).await?;
    info!(channel = %channel, "event relay subscribed");

    while let Some(payload) = subscription.recv().await {
        match serde_json::from_str::<Value>(&payload) {
            Ok(data) => {
                let event = RelayedEvent {
                    channel: channel.clone(),
                    data,
                };
                let delivered = registry.broadcast(&event);
                debug!(channel = %channel, delivered, "event relayed");
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "dropping relay payload that is not valid JSON");
            }
        }
    }

    info!(channel = %channel, "event relay subscription ended");
    Ok(())
}
