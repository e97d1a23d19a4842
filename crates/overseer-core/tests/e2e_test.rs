// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Full-stack tests: a coordinator with live agents, every operation
//! flowing agent → channel → dispatcher → backend and back.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use overseer_core::coordinator::Coordinator;
use serde_json::json;
use tokio::sync::mpsc;

struct Stack {
    coordinator: Coordinator,
    sql: Arc<RecordingSql>,
    cache_backend: Arc<MemoryCache>,
    handles: Vec<AgentHandles>,
}

async fn start_stack(agents: usize) -> Stack {
    let sql = RecordingSql::new();
    let cache_backend = MemoryCache::new();
    let (handles_tx, mut handles_rx) = mpsc::unbounded_channel();
    let coordinator = Coordinator::builder()
        .sql(sql.clone())
        .cache(cache_backend.clone())
        .agent_main(Arc::new(ExportAgent { handles_tx }))
        .agents(agents)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let mut handles = Vec::with_capacity(agents);
    for _ in 0..agents {
        handles.push(handles_rx.recv().await.unwrap());
    }
    Stack {
        coordinator,
        sql,
        cache_backend,
        handles,
    }
}

#[tokio::test]
async fn test_agents_share_the_coordinator_pool() {
    let stack = start_stack(2).await;

    let rows_a = stack.handles[0]
        .db
        .query("SELECT 'from a'", &[])
        .await
        .unwrap();
    let rows_b = stack.handles[1]
        .db
        .query("SELECT 'from b'", &[])
        .await
        .unwrap();
    assert_eq!(rows_a, vec![json!({"statement": "SELECT 'from a'"})]);
    assert_eq!(rows_b, vec![json!({"statement": "SELECT 'from b'"})]);

    // Both statements ran against the one shared backend.
    let statements = stack.sql.statements();
    assert!(statements.contains(&"SELECT 'from a'".to_string()));
    assert!(statements.contains(&"SELECT 'from b'".to_string()));

    stack.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_agents_see_each_others_cache_writes() {
    let stack = start_stack(2).await;

    stack.handles[0]
        .cache
        .set("shared", &json!({"owner": "agent-1"}), None)
        .await
        .unwrap();
    let fetched = stack.handles[1].cache.get("shared").await.unwrap();
    assert_eq!(fetched, Some(json!({"owner": "agent-1"})));

    stack.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_transactions_from_different_agents_do_not_interfere() {
    let stack = start_stack(2).await;

    let tx_a = stack.handles[0].db.transaction();
    let tx_b = stack.handles[1].db.transaction();

    tx_a.query("INSERT INTO a VALUES (1)", &[]).await.unwrap();
    tx_b.query("INSERT INTO b VALUES (2)", &[]).await.unwrap();
    assert_eq!(stack.sql.live_leases(), 2);

    tx_a.commit().await.unwrap();
    tx_b.rollback().await.unwrap();
    assert_eq!(stack.sql.live_leases(), 0);
    assert!(stack.coordinator.transactions().is_empty());

    // Each lease saw its own session statements only.
    let on_lease = stack.sql.lease_statements();
    for lease in [1, 2] {
        let statements: Vec<&str> = on_lease
            .iter()
            .filter(|(l, _)| *l == lease)
            .map(|(_, s)| s.as_str())
            .collect();
        assert_eq!(statements[0], "BEGIN");
        assert_eq!(statements.len(), 3);
    }

    stack.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_published_events_loop_back_through_the_relay() {
    let mut stack = start_stack(1).await;

    // An agent publishes on the relay channel; the coordinator's
    // subscription picks it up and pushes it back to every agent,
    // including the publisher.
    stack.handles[0]
        .cache
        .publish("logs", &json!({"source": "agent"}))
        .await
        .unwrap();

    let event = stack.handles[0].events.recv().await.unwrap();
    assert_eq!(event.channel, "logs");
    assert_eq!(event.data["source"], "agent");

    // External publishers reach agents the same way.
    {
        use overseer_core::backend::CacheBackend;
        stack
            .cache_backend
            .publish("logs", &json!({"source": "external"}).to_string())
            .await
            .unwrap();
    }
    let event = stack.handles[0].events.recv().await.unwrap();
    assert_eq!(event.data["source"], "external");

    stack.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_reflects_live_agents() {
    let stack = start_stack(3).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = stack.coordinator.registry().snapshot();
    assert_eq!(snapshot.len(), 3);
    for agent in &snapshot {
        assert!(agent.heartbeat_age <= agent.uptime);
    }

    stack.coordinator.shutdown().await.unwrap();
}
