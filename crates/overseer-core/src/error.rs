// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the coordinator.
//!
//! Only the display text of these errors ever crosses the channel to an
//! agent: the dispatcher flattens every failure into a reply with the
//! error flag set and the message string as its result.

use thiserror::Error;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Coordinator-side failures during request processing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The database backend failed.
    #[error("database error: {0}")]
    Database(String),

    /// The cache backend failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// A release request named a transaction id with no live lease.
    #[error("unknown transaction {0}")]
    UnknownTransaction(u64),

    /// A request arrived with a field combination the dispatcher cannot
    /// interpret.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::Cache(err.to_string())
    }
}
