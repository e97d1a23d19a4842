// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis backend: one multiplexed command connection plus dedicated
//! pub/sub connections for subscriptions.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::error::CoreError;

/// Buffered payloads per subscription before backpressure applies.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Cache backend over a Redis server.
pub struct RedisBackend {
    client: redis::Client,
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `url` and start the managed command connection.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, manager })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), CoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, value: &str) -> Result<i64, CoreError> {
        let mut conn = self.manager.clone();
        Ok(conn.publish(channel, value).await?)
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, CoreError> {
        // Pub/sub needs its own connection; the manager multiplexes
        // commands and cannot enter subscriber mode.
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_string();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(message) = stream.next().await {
                match message.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "undecodable pub/sub payload");
                    }
                }
            }
            debug!(channel = %channel, "pub/sub stream ended");
        });

        Ok(rx)
    }
}
