// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The live-transaction table: transaction id → leased connection.
//!
//! Leases are created lazily by the first query carrying a transaction
//! id (that is when `BEGIN` runs, not at id allocation) and released
//! exactly once, either by an explicit release request or by the
//! timeout rollback arriving through the same path.
//!
//! Lookup-or-insert happens under a sync mutex, the lease itself lives
//! behind an async mutex per entry. That serializes operations on one
//! transaction id while letting different transactions progress
//! independently, which is exactly the double-acquire guard the
//! dispatcher needs when two queries race on a not-yet-leased id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{SqlBackend, SqlLease};
use crate::error::CoreError;

/// Map of live transactions to their leased connections.
#[derive(Default)]
pub struct TransactionTable {
    entries: StdMutex<HashMap<u64, Arc<TransactionEntry>>>,
}

struct TransactionEntry {
    lease: Mutex<Option<Box<dyn SqlLease>>>,
}

impl TransactionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `statement` on the transaction's leased connection, creating
    /// the lease (and issuing `BEGIN`) if this is the first query for
    /// `id`. A failed statement leaves the lease in place.
    pub async fn query(
        &self,
        backend: &dyn SqlBackend,
        id: u64,
        statement: &str,
        params: &[Value],
    ) -> Result<Vec<Value>, CoreError> {
        let entry = {
            let mut entries = self.entries.lock().expect("transaction table poisoned");
            entries
                .entry(id)
                .or_insert_with(|| {
                    Arc::new(TransactionEntry {
                        lease: Mutex::new(None),
                    })
                })
                .clone()
        };

        let mut guard = entry.lease.lock().await;
        if guard.is_none() {
            // If the checkout or the BEGIN fails the entry stays empty;
            // a retry re-opens it and the eventual release (explicit or
            // timeout-driven) removes it.
            let mut lease = backend.lease().await?;
            lease.query("BEGIN", &[]).await?;
            debug!(transaction = id, "transaction lease opened");
            *guard = Some(lease);
        }
        let lease = guard
            .as_mut()
            .ok_or_else(|| CoreError::Database("transaction lease missing".to_string()))?;

        lease.query(statement, params).await
    }

    /// Return the lease to the pool and forget the transaction id,
    /// regardless of commit/rollback outcome.
    pub async fn release(&self, id: u64) -> Result<(), CoreError> {
        let entry = self
            .entries
            .lock()
            .expect("transaction table poisoned")
            .remove(&id)
            .ok_or(CoreError::UnknownTransaction(id))?;

        let mut guard = entry.lease.lock().await;
        if guard.take().is_some() {
            debug!(transaction = id, "transaction lease released");
        }
        Ok(())
    }

    /// Number of transactions currently holding (or about to hold) a
    /// lease.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("transaction table poisoned")
            .len()
    }

    /// Whether the table has no live transactions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
