// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Overseer Core - the privileged coordinator of the process topology.
//!
//! One coordinator exclusively owns a PostgreSQL connection pool and a
//! Redis connection; a pool of stateless agents performs every database
//! and cache operation by messaging the coordinator over an in-memory
//! duplex channel and awaiting a correlated reply.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Coordinator (this crate)                   │
//! │                                                                 │
//! │  Dispatcher ──► SqlBackend (PgPool)    CacheBackend (Redis)     │
//! │      │                │                      │                  │
//! │      │          TransactionTable        Event Relay ◄── pub/sub │
//! │      │                                       │                  │
//! │  Watchdog Supervisor (heartbeats, escalate, respawn)            │
//! └──────┬───────────────────────────────────────┬──────────────────┘
//!        │  duplex channel per agent             │ events fan out
//!        ▼                                       ▼
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────┐
//! │    Agent 1    │  │    Agent 2    │  │    Agent N    │
//! │ (overseer-sdk)│  │ (overseer-sdk)│  │ (overseer-sdk)│
//! └───────────────┘  └───────────────┘  └───────────────┘
//! ```
//!
//! # Responsibilities
//!
//! | Component | Role |
//! |-----------|------|
//! | [`dispatch`] | Classify inbound messages, execute sql/cache work, reply |
//! | [`transactions`] | Live-transaction table: id → leased connection |
//! | [`watchdog`] | Heartbeat tracking, graduated escalation, health snapshots |
//! | [`relay`] | Re-broadcast external pub/sub events to every agent |
//! | [`coordinator`] | Builder, agent spawn/respawn glue, shutdown |
//! | [`backend`] | Database and cache seams plus the Postgres/Redis impls |
//!
//! # Supervision
//!
//! Agents heartbeat once a second. The watchdog sweeps every second and
//! escalates per agent through an explicit state machine:
//!
//! ```text
//! Healthy ──10s──► Warned ──20s──► Terminating ──30s──► Killed
//!    ▲                                                    │
//!    └────────────── heartbeat received ◄─────────────────┘ (respawn)
//! ```
//!
//! Any exit, clean or not, deletes the agent's registry entry and
//! spawns exactly one replacement. There is no backoff.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `OVERSEER_DATABASE_URL` | Yes | - | PostgreSQL connection string |
//! | `OVERSEER_CACHE_URL` | Yes | - | Redis connection string |
//! | `OVERSEER_AGENTS` | No | parallelism | Agent pool size |
//! | `OVERSEER_RELAY_CHANNEL` | No | `logs` | Relay subscription channel |

#![deny(missing_docs)]

/// Database and cache backend seams plus production implementations.
pub mod backend;

/// Coordinator configuration from environment variables.
pub mod config;

/// Builder, agent pool spawn/respawn glue and shutdown.
pub mod coordinator;

/// Per-agent message dispatcher.
pub mod dispatch;

/// Error types for coordinator operations.
pub mod error;

/// Event relay from the external pub/sub channel to every agent.
pub mod relay;

/// Live-transaction table mapping ids to leased connections.
pub mod transactions;

/// Agent registry and the watchdog supervisor.
pub mod watchdog;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{CoreError, Result};
