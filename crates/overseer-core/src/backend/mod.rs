// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend interfaces and implementations for the coordinator.
//!
//! The dispatcher talks to the database and the cache through these
//! traits; production wires in [`PostgresBackend`] and [`RedisBackend`],
//! tests substitute in-memory doubles.

pub mod postgres;
pub mod redis;

pub use self::postgres::PostgresBackend;
pub use self::redis::RedisBackend;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// Database access owned exclusively by the coordinator.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Run one statement against the shared pool, acquiring and
    /// releasing a connection within the call. Rows come back as JSON
    /// objects keyed by column name.
    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Value>, CoreError>;

    /// Check one connection out of the pool for exclusive use by a
    /// transaction. Dropping the lease returns the connection.
    async fn lease(&self) -> Result<Box<dyn SqlLease>, CoreError>;
}

/// An exclusively checked-out database connection bound to one
/// transaction until released.
#[async_trait]
pub trait SqlLease: Send {
    /// Run one statement on the leased connection.
    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Value>, CoreError>;
}

/// Cache access owned exclusively by the coordinator. Values are opaque
/// strings; agents serialize before sending.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the value under `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    /// Store `value` under `key` with no expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;

    /// Store `value` under `key`, expiring after `seconds`.
    async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<(), CoreError>;

    /// Publish `value` on a pub/sub channel; returns the receiver count.
    async fn publish(&self, channel: &str, value: &str) -> Result<i64, CoreError>;

    /// Subscribe to a pub/sub channel. Payloads arrive on the returned
    /// receiver until the subscription is dropped.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, CoreError>;
}
