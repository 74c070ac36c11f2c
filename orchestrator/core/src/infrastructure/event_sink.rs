// Copyright (c) 2026 HiveMind contributors
// SPDX-License-Identifier: AGPL-3.0

//! Time-series event sink
//!
//! Batching append target for the observer pipeline. The Postgres sink is
//! the durable implementation; the in-memory sink backs tests and the
//! embedded runtime.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::events::EventLog;

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append a batch of event logs. Implementations must tolerate
    /// duplicate appends of the same events.
    async fn append(&self, events: &[EventLog]) -> anyhow::Result<()>;
}

/// Sink that retains events in process memory.
pub struct InMemoryEventSink {
    events: Mutex<Vec<EventLog>>,
}

impl InMemoryEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<EventLog> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn append(&self, events: &[EventLog]) -> anyhow::Result<()> {
        self.events.lock().await.extend_from_slice(events);
        Ok(())
    }
}

/// Durable sink writing into a Postgres events table.
pub struct PostgresEventSink {
    pool: PgPool,
}

impl PostgresEventSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the events table when it does not exist yet.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                timestamp BIGINT NOT NULL,
                protocol TEXT NOT NULL,
                type TEXT NOT NULL,
                subject TEXT NOT NULL,
                data BYTEA NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                status TEXT NOT NULL,
                error TEXT,
                processed_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events (timestamp)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_subject ON events (subject)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for PostgresEventSink {
    async fn append(&self, events: &[EventLog]) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    timestamp, protocol, type, subject, data,
                    metadata, status, error, processed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.timestamp)
            .bind(&event.protocol)
            .bind(&event.kind)
            .bind(&event.subject)
            .bind(&event.data)
            .bind(serde_json::to_value(&event.metadata)?)
            .bind(&event.status)
            .bind(&event.error)
            .bind(event.processed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_appends_batches() {
        let sink = InMemoryEventSink::new();
        let batch = vec![
            EventLog::message("in-process", "a", vec![1]),
            EventLog::message("in-process", "b", vec![2]),
        ];
        sink.append(&batch).await.unwrap();
        sink.append(&batch[..1]).await.unwrap();
        assert_eq!(sink.len().await, 3);
        assert_eq!(sink.snapshot().await[0].subject, "a");
    }
}
