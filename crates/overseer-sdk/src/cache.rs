// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cache proxy: get/set-with-TTL/publish delegated to the coordinator.
//!
//! Values are serialized to JSON text on this side of the channel and
//! parsed back on `get`; the coordinator stores the text without
//! interpreting it. TTLs travel as milliseconds and are floored to whole
//! seconds by the coordinator before it instructs the cache service.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use overseer_protocol::{CacheCommand, RequestBody};

use crate::error::SdkError;
use crate::mailbox::Mailbox;

/// Handle for cache access through the coordinator.
#[derive(Clone)]
pub struct Cache {
    mailbox: Arc<Mailbox>,
}

impl Cache {
    /// Build a cache proxy on top of a mailbox.
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Fetch and parse the value stored under `key`, or `None` when the
    /// key is absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, SdkError> {
        let result = self
            .mailbox
            .call(RequestBody::Cache(CacheCommand::Get {
                key: key.to_string(),
            }))
            .await?;
        match result {
            Value::Null => Ok(None),
            Value::String(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            other => Err(SdkError::UnexpectedReply(format!(
                "expected a cached string, got {other}"
            ))),
        }
    }

    /// Store `value` under `key`. With a TTL the key expires after
    /// roughly that long (floored to whole seconds); without one it
    /// never expires.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), SdkError> {
        self.mailbox
            .call(RequestBody::Cache(CacheCommand::Set {
                key: key.to_string(),
                value: serde_json::to_string(value)?,
                ttl_ms: ttl.map(|t| t.as_millis() as u64),
            }))
            .await?;
        Ok(())
    }

    /// Publish `value` on a pub/sub channel. Returns the number of
    /// subscribers that received it.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        value: &T,
    ) -> Result<i64, SdkError> {
        let result = self
            .mailbox
            .call(RequestBody::Cache(CacheCommand::Publish {
                channel: channel.to_string(),
                value: serde_json::to_string(value)?,
            }))
            .await?;
        result.as_i64().ok_or_else(|| {
            SdkError::UnexpectedReply(format!("expected a receiver count, got {result}"))
        })
    }
}
