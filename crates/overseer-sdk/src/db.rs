// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Query proxy and transaction leases.
//!
//! [`Database::query`] is the fire-and-forget-pooled path: the
//! coordinator acquires a pool connection, runs the statement and
//! releases the connection, all within one round trip.
//!
//! [`Transaction`] groups statements on one exclusively leased
//! connection. The proxy only ever allocates the transaction id; the
//! coordinator checks out the connection and issues the session-start
//! statement lazily when the first query carrying that id arrives.
//! Commit and rollback each issue their closing statement followed by a
//! release request (the same `sql` message with the id but no statement
//! text), after which the id is dead and any further use fails locally
//! with [`SdkError::TransactionCompleted`].
//!
//! A two-stage timer guards abandoned transactions: after the timeout a
//! warning is logged, after twice the timeout the transaction is forcibly
//! rolled back and its lease released. The original caller is presumed
//! gone and is not notified.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use overseer_protocol::RequestBody;

use crate::error::SdkError;
use crate::mailbox::Mailbox;

/// Idle time before the first timeout stage; the second stage fires
/// after twice this.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for database access through the coordinator.
#[derive(Clone)]
pub struct Database {
    mailbox: Arc<Mailbox>,
}

impl Database {
    /// Build a database proxy on top of a mailbox.
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Run a single statement against the shared pool and return its
    /// rows. The coordinator acquires and releases a connection per
    /// call.
    pub async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Value>, SdkError> {
        let result = self
            .mailbox
            .call(RequestBody::Sql {
                transaction: None,
                statement: Some(statement.to_string()),
                params: params.to_vec(),
            })
            .await?;
        rows(result)
    }

    /// Open a transaction handle with the default timeout.
    pub fn transaction(&self) -> Transaction {
        self.transaction_with_timeout(DEFAULT_TRANSACTION_TIMEOUT)
    }

    /// Open a transaction handle with a custom first-stage timeout.
    pub fn transaction_with_timeout(&self, timeout: Duration) -> Transaction {
        Transaction::new(self.mailbox.clone(), timeout)
    }
}

/// A leased, stateful database session spanning several round trips.
pub struct Transaction {
    id: u64,
    mailbox: Arc<Mailbox>,
    completed: Arc<Mutex<bool>>,
    timer: JoinHandle<()>,
}

impl Transaction {
    fn new(mailbox: Arc<Mailbox>, timeout: Duration) -> Self {
        // Random id in a namespace of its own; the coordinator keys its
        // live-transaction table on it. Distinct from request nonces.
        let id = rand::random::<u64>();
        let completed = Arc::new(Mutex::new(false));
        let timer = arm_timer(mailbox.clone(), id, completed.clone(), timeout);
        Self {
            id,
            mailbox,
            completed,
            timer,
        }
    }

    /// The transaction identifier, as the coordinator sees it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run a statement on this transaction's leased connection. The
    /// first call makes the coordinator check out a connection and start
    /// the session; later calls reuse it. A statement failure leaves the
    /// lease open so the caller can retry or roll back.
    pub async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Value>, SdkError> {
        let completed = self.completed.lock().await;
        if *completed {
            return Err(SdkError::TransactionCompleted);
        }
        let result = tx_call(&self.mailbox, self.id, Some(statement), params).await?;
        rows(result)
    }

    /// Commit and release the lease.
    pub async fn commit(&self) -> Result<(), SdkError> {
        self.finish("COMMIT").await
    }

    /// Roll back and release the lease.
    pub async fn rollback(&self) -> Result<(), SdkError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&self, statement: &str) -> Result<(), SdkError> {
        let mut completed = self.completed.lock().await;
        if *completed {
            return Err(SdkError::TransactionCompleted);
        }
        // A failed COMMIT/ROLLBACK returns here with the lease still
        // open; the caller decides what happens next.
        tx_call(&self.mailbox, self.id, Some(statement), &[]).await?;
        tx_call(&self.mailbox, self.id, None, &[]).await?;
        *completed = true;
        self.timer.abort();
        Ok(())
    }
}

async fn tx_call(
    mailbox: &Mailbox,
    id: u64,
    statement: Option<&str>,
    params: &[Value],
) -> Result<Value, SdkError> {
    mailbox
        .call(RequestBody::Sql {
            transaction: Some(id),
            statement: statement.map(str::to_string),
            params: params.to_vec(),
        })
        .await
}

fn rows(result: Value) -> Result<Vec<Value>, SdkError> {
    match result {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => Err(SdkError::UnexpectedReply(format!(
            "expected a row set, got {other}"
        ))),
    }
}

/// Two-stage escalation for transactions nobody finished: warn, then
/// force a rollback through the normal message path. The task holds the
/// completed flag and exits silently if commit/rollback got there first.
fn arm_timer(
    mailbox: Arc<Mailbox>,
    id: u64,
    completed: Arc<Mutex<bool>>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if *completed.lock().await {
            return;
        }
        warn!(
            transaction = id,
            "transaction hasn't finished in {}s",
            timeout.as_secs()
        );

        tokio::time::sleep(timeout).await;
        let mut completed = completed.lock().await;
        if *completed {
            return;
        }
        error!(
            transaction = id,
            "transaction hasn't finished in {}s, rolling back",
            (2 * timeout).as_secs()
        );
        if let Err(e) = tx_call(&mailbox, id, Some("ROLLBACK"), &[]).await {
            warn!(transaction = id, error = %e, "timeout rollback failed");
        }
        if let Err(e) = tx_call(&mailbox, id, None, &[]).await {
            warn!(transaction = id, error = %e, "timeout release failed");
        }
        *completed = true;
    })
}
