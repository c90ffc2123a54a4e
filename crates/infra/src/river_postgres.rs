//! River job table reader over PostgreSQL.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobshift_core::format_timestamp;
use jobshift_sources::{RiverJobRecord, RiverStore, StoreError, PENDING_STATES};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, instrument};

use crate::error::ConnectError;

const COUNT_SQL: &str = r#"
    SELECT queue, COUNT(*) AS pending
    FROM river_job
    WHERE state::text = ANY($1)
    GROUP BY queue
"#;

const JOBS_SQL: &str = r#"
    SELECT
        id,
        kind,
        args,
        queue,
        state::text AS state,
        priority::bigint AS priority,
        CASE WHEN state::text = 'scheduled' THEN scheduled_at END AS scheduled_at,
        metadata
    FROM river_job
    WHERE queue = $1 AND state::text = ANY($2)
    ORDER BY id
"#;

/// Reads pending rows of `river_job`. Never writes.
#[derive(Debug, Clone)]
pub struct PostgresRiverStore {
    pool: PgPool,
}

impl PostgresRiverStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| ConnectError::Postgres(e.to_string()))?;
        info!("connected to postgres");
        Ok(Self::new(pool))
    }

    fn pending_states() -> Vec<String> {
        PENDING_STATES.iter().map(|s| s.to_string()).collect()
    }
}

fn record_from_row(row: &PgRow) -> Result<RiverJobRecord, sqlx::Error> {
    let scheduled_at: Option<DateTime<Utc>> = row.try_get("scheduled_at")?;
    Ok(RiverJobRecord {
        id: Some(row.try_get("id")?),
        kind: row.try_get("kind")?,
        args: row.try_get::<JsonValue, _>("args")?,
        queue: row.try_get("queue")?,
        state: Some(row.try_get("state")?),
        priority: Some(row.try_get("priority")?),
        scheduled_at: scheduled_at.map(format_timestamp),
        metadata: row.try_get::<Option<JsonValue>, _>("metadata")?,
    })
}

fn store_error(err: sqlx::Error) -> StoreError {
    StoreError::new(err.to_string())
}

#[async_trait]
impl RiverStore for PostgresRiverStore {
    async fn queue_counts(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let rows = sqlx::query(COUNT_SQL)
            .bind(Self::pending_states())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let queue: String = row.try_get("queue").map_err(store_error)?;
            let pending: i64 = row.try_get("pending").map_err(store_error)?;
            counts.insert(queue, u64::try_from(pending).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn pending_jobs(&self, queue: &str) -> Result<Vec<RiverJobRecord>, StoreError> {
        let rows = sqlx::query(JOBS_SQL)
            .bind(queue)
            .bind(Self::pending_states())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter()
            .map(|row| record_from_row(row).map_err(store_error))
            .collect()
    }
}
