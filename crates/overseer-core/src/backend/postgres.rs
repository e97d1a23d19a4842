// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL backend over an sqlx connection pool.
//!
//! Statements arrive with positional JSON parameters and leave with JSON
//! rows, since that is the only shape that crosses the agent channel.
//! Parameter binding and row decoding cover the column types the models
//! actually use; anything exotic falls back to its text representation.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};

use crate::backend::{SqlBackend, SqlLease};
use crate::error::CoreError;

/// Shared-pool database backend.
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a fresh pool of 10 to `url`.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    async fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Value>, CoreError> {
        let rows = bind_params(statement, params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn lease(&self) -> Result<Box<dyn SqlLease>, CoreError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PostgresLease { conn }))
    }
}

/// One checked-out pool connection; dropping it returns the connection.
struct PostgresLease {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl SqlLease for PostgresLease {
    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Value>, CoreError> {
        let rows = bind_params(statement, params)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.iter().map(row_to_json).collect()
    }
}

fn bind_params<'q>(statement: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(statement);
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => query.bind(s.clone()),
            // Arrays and objects bind as JSONB.
            other => query.bind(other.clone()),
        };
    }
    query
}

fn row_to_json(row: &PgRow) -> Result<Value, CoreError> {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, CoreError> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::from(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
            .try_get::<Option<String>, _>(index)?
            .map(Value::String),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|t| Value::String(t.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|t| Value::String(t.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(|d| Value::String(d.to_string())),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(|u| Value::String(u.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        // Unknown types: text representation when the driver offers
        // one, null otherwise.
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}
