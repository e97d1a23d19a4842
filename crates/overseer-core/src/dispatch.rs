// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The coordinator's message handler, one task per agent channel.
//!
//! Heartbeats are handled inline (update the registry, acknowledge).
//! Requests are spawned onto their own tasks so a slow statement never
//! blocks the channel; replies may therefore overtake each other, which
//! is fine because the correlation layer matches them by nonce. Work on
//! one transaction id is still serialized, by the transaction table's
//! per-entry lock, so racing first queries cannot double-acquire a
//! pooled connection.
//!
//! Every backend failure is flattened to its message text and returned
//! with the reply's error flag set; structured errors never cross the
//! channel.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use overseer_protocol::{
    AgentMessage, CacheCommand, CoordinatorChannel, CoordinatorMessage, Reply, RequestBody,
};

use crate::backend::{CacheBackend, SqlBackend};
use crate::error::CoreError;
use crate::transactions::TransactionTable;
use crate::watchdog::{AgentId, AgentRegistry};

/// Everything a dispatcher task needs, shared across all agents.
pub struct DispatchState {
    /// The exclusively owned database pool.
    pub sql: Arc<dyn SqlBackend>,
    /// The exclusively owned cache client.
    pub cache: Arc<dyn CacheBackend>,
    /// Live transactions, shared by every agent's dispatcher.
    pub transactions: Arc<TransactionTable>,
    /// Agent table, for heartbeat bookkeeping.
    pub registry: Arc<AgentRegistry>,
}

/// Serve one agent's channel until the agent end goes away.
pub async fn run_dispatcher(
    agent: AgentId,
    channel: CoordinatorChannel,
    state: Arc<DispatchState>,
) {
    let (sender, mut inbound) = channel.into_parts();

    while let Some(message) = inbound.recv().await {
        match message {
            AgentMessage::Heartbeat => {
                state.registry.beat(agent);
                let _ = sender.send(CoordinatorMessage::Reply(Reply::heartbeat_ack()));
            }
            AgentMessage::Request(request) => {
                let state = state.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    let kind = request.body.kind();
                    let reply = match handle_request(&state, request.body).await {
                        Ok(result) => Reply::ok(request.nonce, kind, result),
                        Err(e) => {
                            debug!(agent = %agent, nonce = request.nonce, error = %e, "request failed");
                            Reply::err(request.nonce, kind, e.to_string())
                        }
                    };
                    // The agent may have exited while we worked.
                    let _ = sender.send(CoordinatorMessage::Reply(reply));
                });
            }
        }
    }

    debug!(agent = %agent, "agent channel closed");
}

async fn handle_request(state: &DispatchState, body: RequestBody) -> Result<Value, CoreError> {
    match body {
        RequestBody::Sql {
            transaction,
            statement,
            params,
        } => handle_sql(state, transaction, statement, params).await,
        RequestBody::Cache(command) => handle_cache(state, command).await,
    }
}

async fn handle_sql(
    state: &DispatchState,
    transaction: Option<u64>,
    statement: Option<String>,
    params: Vec<Value>,
) -> Result<Value, CoreError> {
    match (transaction, statement) {
        // Plain pooled statement: acquire, run, release within the call.
        (None, Some(statement)) => {
            let rows = state.sql.query(&statement, &params).await?;
            Ok(Value::Array(rows))
        }
        // Statement on a leased connection; the table opens the lease
        // (and BEGINs) on first use.
        (Some(id), Some(statement)) => {
            let rows = state
                .transactions
                .query(state.sql.as_ref(), id, &statement, &params)
                .await?;
            Ok(Value::Array(rows))
        }
        // Id but no statement text: return the lease to the pool and
        // forget the transaction, whatever the commit/rollback outcome
        // was.
        (Some(id), None) => {
            state.transactions.release(id).await?;
            Ok(Value::Null)
        }
        (None, None) => Err(CoreError::MalformedRequest(
            "sql request with neither statement nor transaction",
        )),
    }
}

async fn handle_cache(state: &DispatchState, command: CacheCommand) -> Result<Value, CoreError> {
    match command {
        CacheCommand::Get { key } => Ok(state
            .cache
            .get(&key)
            .await?
            .map(Value::String)
            .unwrap_or(Value::Null)),
        CacheCommand::Set { key, value, ttl_ms } => {
            match ttl_ms {
                // Milliseconds to whole seconds, floor-rounded.
                Some(ms) => state.cache.set_ex(&key, &value, ms / 1000).await?,
                None => state.cache.set(&key, &value).await?,
            }
            Ok(Value::String("OK".to_string()))
        }
        CacheCommand::Publish { channel, value } => {
            let receivers = state.cache.publish(&channel, &value).await?;
            Ok(Value::from(receivers))
        }
    }
}
