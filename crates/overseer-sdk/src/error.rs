// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use thiserror::Error;

/// Errors surfaced to agent code by the proxies.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The coordinator's operation failed. Carries the error message
    /// text and nothing else; the structured error never crosses the
    /// channel.
    #[error("{0}")]
    Remote(String),

    /// A transaction method was invoked after commit, rollback or a
    /// timeout rollback. Raised locally without contacting the
    /// coordinator.
    #[error("transaction has already completed")]
    TransactionCompleted,

    /// The duplex channel to the coordinator is gone; the call cannot be
    /// delivered or its reply will never arrive.
    #[error("coordinator channel closed")]
    ChannelClosed,

    /// A value could not be serialized for the channel or parsed back.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coordinator answered with a result shape this proxy does not
    /// understand.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_message_only() {
        let err = SdkError::Remote("relation \"users\" does not exist".to_string());
        assert_eq!(err.to_string(), "relation \"users\" does not exist");
    }

    #[test]
    fn test_completed_transaction_message() {
        assert_eq!(
            SdkError::TransactionCompleted.to_string(),
            "transaction has already completed"
        );
    }
}
