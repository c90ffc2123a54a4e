//! Redis-backed [`KeyValueStore`] for the Sidekiq, BullMQ and Celery adapters.
//!
//! Uses one multiplexed async connection; every command clones the handle,
//! so concurrent calls pipeline over the same socket. Read-only commands only.

use std::collections::HashMap;

use async_trait::async_trait;
use jobshift_sources::{KeyValueStore, StoreError};
use redis::aio::MultiplexedConnection;
use tracing::{info, instrument};

use crate::error::ConnectError;

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: u32 = 500;

#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: MultiplexedConnection,
}

impl RedisKeyValueStore {
    /// Open a connection to `url` (e.g. `redis://localhost:6379/0`).
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str) -> Result<Self, ConnectError> {
        let client = redis::Client::open(url).map_err(|e| ConnectError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ConnectError::Redis(e.to_string()))?;
        info!("connected to redis");
        Ok(Self { conn })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| StoreError::new(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("LRANGE").arg(key).arg(start).arg(stop)).await
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        self.query(redis::cmd("LLEN").arg(key)).await
    }

    async fn sorted_set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("ZRANGE").arg(key).arg(0).arg(-1)).await
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, StoreError> {
        self.query(redis::cmd("ZCARD").arg(key)).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.query(redis::cmd("HGETALL").arg(key)).await
    }
}
