//! Key-value store collaborator used by the Redis-backed adapters.
//!
//! The adapters only need a handful of read commands. The trait keeps them
//! independent of any driver; `jobshift-infra` provides the Redis
//! implementation and [`InMemoryKeyValueStore`] serves tests and dev.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Read-only subset of Redis commands the adapters rely on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `SMEMBERS key`
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// `LRANGE key start stop` (inclusive, negative indexes count from the end).
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    /// `LLEN key`
    async fn list_len(&self, key: &str) -> Result<u64, StoreError>;

    /// `ZRANGE key 0 -1`, members only, lowest score first.
    async fn sorted_set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// `ZCARD key`
    async fn sorted_set_len(&self, key: &str) -> Result<u64, StoreError>;

    /// Full `SCAN ... MATCH pattern` iteration.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// `HGETALL key`
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
}

#[async_trait]
impl<T> KeyValueStore for Arc<T>
where
    T: KeyValueStore + ?Sized,
{
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).set_members(key).await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        (**self).list_range(key, start, stop).await
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        (**self).list_len(key).await
    }

    async fn sorted_set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).sorted_set_members(key).await
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, StoreError> {
        (**self).sorted_set_len(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        (**self).scan_keys(pattern).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        (**self).hash_get_all(key).await
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    sets: BTreeMap<String, BTreeSet<String>>,
    lists: BTreeMap<String, Vec<String>>,
    sorted: BTreeMap<String, Vec<(f64, String)>>,
    hashes: BTreeMap<String, HashMap<String, String>>,
}

impl Keyspace {
    fn keys(&self) -> impl Iterator<Item = &String> {
        self.sets
            .keys()
            .chain(self.lists.keys())
            .chain(self.sorted.keys())
            .chain(self.hashes.keys())
    }
}

/// In-memory key-value store.
///
/// Intended for tests/dev. Can simulate an outage ([`Self::set_unavailable`])
/// and a slow link ([`Self::with_latency`]).
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    keyspace: RwLock<Keyspace>,
    unavailable: RwLock<Option<String>>,
    latency: Option<Duration>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While set, every call fails with the given message.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.write().unwrap_or_else(PoisonError::into_inner) =
            reason.map(str::to_string);
    }

    pub fn sadd(&self, key: &str, member: &str) {
        self.write(|ks| {
            ks.sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string());
        });
    }

    pub fn rpush(&self, key: &str, value: &str) {
        self.write(|ks| {
            ks.lists
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        });
    }

    pub fn zadd(&self, key: &str, score: f64, member: &str) {
        self.write(|ks| {
            let set = ks.sorted.entry(key.to_string()).or_default();
            set.retain(|(_, m)| m != member);
            set.push((score, member.to_string()));
            set.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        });
    }

    pub fn hset(&self, key: &str, field: &str, value: &str) {
        self.write(|ks| {
            ks.hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        });
    }

    fn write(&self, f: impl FnOnce(&mut Keyspace)) {
        let mut ks = self.keyspace.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut ks);
    }

    async fn read<T>(&self, f: impl FnOnce(&Keyspace) -> T) -> Result<T, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = self
            .unavailable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(StoreError(reason));
        }
        let ks = self.keyspace.read().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&ks))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.read(|ks| {
            ks.sets
                .get(key)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        })
        .await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.read(|ks| {
            let list = ks.lists.get(key).map(Vec::as_slice).unwrap_or_default();
            match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list[from..=to].to_vec(),
                None => Vec::new(),
            }
        })
        .await
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        self.read(|ks| ks.lists.get(key).map_or(0, |l| l.len() as u64))
            .await
    }

    async fn sorted_set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.read(|ks| {
            ks.sorted
                .get(key)
                .map(|s| s.iter().map(|(_, m)| m.clone()).collect())
                .unwrap_or_default()
        })
        .await
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, StoreError> {
        self.read(|ks| ks.sorted.get(key).map_or(0, |s| s.len() as u64))
            .await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.read(|ks| {
            let matched: BTreeSet<String> = ks
                .keys()
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect();
            matched.into_iter().collect()
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.read(|ks| ks.hashes.get(key).cloned().unwrap_or_default())
            .await
    }
}

/// Redis-style inclusive range → slice bounds, `None` when empty.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let norm = |i: i64| if i < 0 { len + i } else { i };
    let from = norm(start).max(0);
    let to = norm(stop).min(len - 1);
    if from > to || from >= len {
        return None;
    }
    Some((from as usize, to as usize))
}

/// `*`-only glob matching, as used by `SCAN MATCH` patterns in this crate.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}
