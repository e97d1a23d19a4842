// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end correlation tests: many concurrent calls multiplexed over
//! one agent channel, each resolving with the reply that carries its
//! own nonce.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use overseer_protocol::AgentMessage;
use overseer_sdk::SdkError;
use serde_json::json;

#[tokio::test]
async fn test_concurrent_queries_resolve_with_their_own_results() {
    let sql = RecordingSql::new();
    let harness = dispatch_harness(sql.clone(), MemoryCache::new());
    let db = Arc::new(harness.db.clone());

    // Stagger delays so later calls answer earlier.
    let handles: Vec<_> = (0..16u64)
        .map(|i| {
            let db = db.clone();
            let statement = format!("delay:{} q{}", (16 - i) * 5, i);
            tokio::spawn(async move { (i, db.query(&statement, &[]).await) })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        let rows = result.unwrap();
        assert_eq!(rows, vec![json!({"statement": format!("q{}", i)})]);
    }
}

#[tokio::test]
async fn test_replies_arrive_out_of_issuance_order() {
    let sql = RecordingSql::new();
    let harness = dispatch_harness(sql.clone(), MemoryCache::new());
    let completions: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let slow = {
        let db = harness.db.clone();
        let completions = completions.clone();
        tokio::spawn(async move {
            let rows = db.query("delay:100 slow", &[]).await.unwrap();
            completions.lock().unwrap().push("slow");
            rows
        })
    };
    let fast = {
        let db = harness.db.clone();
        let completions = completions.clone();
        tokio::spawn(async move {
            let rows = db.query("fast", &[]).await.unwrap();
            completions.lock().unwrap().push("fast");
            rows
        })
    };

    assert_eq!(fast.await.unwrap(), vec![json!({"statement": "fast"})]);
    assert_eq!(slow.await.unwrap(), vec![json!({"statement": "slow"})]);
    // The second call finished first, i.e. its reply overtook the
    // first call's reply on the same channel.
    assert_eq!(*completions.lock().unwrap(), vec!["fast", "slow"]);
}

#[tokio::test]
async fn test_heartbeats_interleaved_with_requests_disturb_nothing() {
    let sql = RecordingSql::new();
    let harness = dispatch_harness(sql.clone(), MemoryCache::new());
    let sender = harness.mailbox.sender();

    let query = {
        let db = harness.db.clone();
        tokio::spawn(async move { db.query("delay:30 work", &[]).await })
    };

    // Heartbeats (and their nonce-less acks) flow while the query is in
    // flight.
    for _ in 0..5 {
        sender.send(AgentMessage::Heartbeat).unwrap();
        tokio::task::yield_now().await;
    }

    let rows = query.await.unwrap().unwrap();
    assert_eq!(rows, vec![json!({"statement": "work"})]);
    assert_eq!(harness.mailbox.outstanding(), 0);
}

#[tokio::test]
async fn test_backend_failure_surfaces_as_remote_error_text() {
    let sql = RecordingSql::new();
    let harness = dispatch_harness(sql.clone(), MemoryCache::new());

    let err = harness.db.query("fail hard", &[]).await.unwrap_err();
    match err {
        SdkError::Remote(message) => {
            assert_eq!(message, "database error: synthetic failure");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_dropping_the_dispatcher_unblocks_callers() {
    let sql = RecordingSql::new();
    let mut harness = dispatch_harness(sql.clone(), MemoryCache::new());

    // Kill the coordinator side before it can answer. Aborting the
    // dispatcher drops its channel end; the request was never received,
    // so no orphaned reply task holds the channel open.
    harness.dispatcher.abort();
    let _ = (&mut harness.dispatcher).await;

    let err = harness.db.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, SdkError::ChannelClosed));
}
