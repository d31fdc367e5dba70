// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process store with Redis-like semantics.
//!
//! Strings and hashes live in one keyspace with lazy expiry measured on
//! tokio's clock, so `tokio::time::pause()` drives TTLs in tests. Pub/sub
//! fans out to every live subscription in the same process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::traits::{KeyTtl, KvStore, StorageError, StoreMessage};

#[derive(Debug, Clone)]
enum Slot {
    Str(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
    /// Insertion order; SCAN cursors point into this sequence so deleting
    /// keys mid-scan never skips the ones not yet visited.
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Subscription {
    channels: HashSet<String>,
    tx: mpsc::UnboundedSender<StoreMessage>,
}

pub struct InMemoryStore {
    data: DashMap<String, Entry>,
    next_seq: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            next_seq: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Current live key count
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all keys
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Number of open subscriptions (receivers not yet dropped).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscriptions.lock();
        subs.retain(|s| !s.tx.is_closed());
        subs.len()
    }

    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.data.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn expiry(ttl_secs: Option<u64>) -> Option<Instant> {
        ttl_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.purge_if_expired(key);
        match self.data.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Str(s) => Ok(Some(s.clone())),
                Slot::Hash(_) => Err(StorageError::WrongType { key: key.to_string() }),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StorageError> {
        self.data.insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(value.to_string()),
                expires_at: Self::expiry(ttl_secs),
                seq: self.seq(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.purge_if_expired(key);
        Ok(self.data.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.purge_if_expired(key);
        Ok(self.data.contains_key(key))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>), StorageError> {
        let now = Instant::now();
        let mut live: Vec<(u64, String)> = self
            .data
            .iter()
            .filter(|e| e.value().seq >= cursor && !e.value().is_expired(now))
            .map(|e| (e.value().seq, e.key().clone()))
            .collect();
        live.sort_unstable_by_key(|(seq, _)| *seq);

        let take = count.max(1);
        let next = if live.len() > take { live[take].0 } else { 0 };
        let batch = live
            .into_iter()
            .take(take)
            .filter(|(_, k)| glob_match(pattern, k))
            .map(|(_, k)| k)
            .collect();

        Ok((next, batch))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        self.purge_if_expired(key);
        match self.data.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.slot {
                Slot::Hash(map) => Ok(map.get(field).cloned()),
                Slot::Str(_) => Err(StorageError::WrongType { key: key.to_string() }),
            },
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        self.purge_if_expired(key);
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Hash(HashMap::new()),
            expires_at: None,
            seq: self.seq(),
        });
        match &mut entry.slot {
            Slot::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Slot::Str(_) => Err(StorageError::WrongType { key: key.to_string() }),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        self.purge_if_expired(key);
        let removed = match self.data.get_mut(key) {
            None => return Ok(false),
            Some(mut entry) => match &mut entry.slot {
                Slot::Hash(map) => map.remove(field).is_some(),
                Slot::Str(_) => return Err(StorageError::WrongType { key: key.to_string() }),
            },
        };
        // Redis drops a hash once its last field is gone
        self.data
            .remove_if(key, |_, e| matches!(&e.slot, Slot::Hash(map) if map.is_empty()));
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StorageError> {
        self.purge_if_expired(key);
        if ttl_secs == 0 {
            return Ok(self.data.remove(key).is_some());
        }
        match self.data.get_mut(key) {
            None => Ok(false),
            Some(mut entry) => {
                entry.expires_at = Self::expiry(Some(ttl_secs));
                Ok(true)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StorageError> {
        self.purge_if_expired(key);
        let now = Instant::now();
        Ok(match self.data.get(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.expires_at {
                None => KeyTtl::Persistent,
                Some(at) => {
                    let millis = at.saturating_duration_since(now).as_millis() as u64;
                    KeyTtl::Seconds(millis.div_ceil(1000))
                }
            },
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StorageError> {
        let mut subs = self.subscriptions.lock();
        subs.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for sub in subs.iter().filter(|s| s.channels.contains(channel)) {
            let msg = StoreMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            if sub.tx.send(msg).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<mpsc::UnboundedReceiver<StoreMessage>, StorageError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().push(Subscription {
            channels: channels.iter().cloned().collect(),
            tx,
        });
        Ok(rx)
    }
}

/// Redis-style glob: `*` any run, `?` any single char, `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // position of the last '*' and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
                continue;
            }
            Some('?') => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some('\\') if p.get(pi + 1) == Some(&t[ti]) => {
                pi += 2;
                ti += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == t[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, from)) => {
                pi = star + 1;
                ti = from + 1;
                backtrack = Some((star, from + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set("c:user:1", "\"Ann\"", Some(60)).await.unwrap();

        assert_eq!(store.get("c:user:1").await.unwrap().as_deref(), Some("\"Ann\""));
        assert_eq!(store.ttl("c:user:1").await.unwrap(), KeyTtl::Seconds(60));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.get("nonexistent").await.unwrap().is_none());
        assert_eq!(store.ttl("nonexistent").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_set_without_ttl_is_persistent() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        store.set("k0", "v", Some(0)).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Persistent);
        assert_eq!(store.ttl("k0").await.unwrap(), KeyTtl::Persistent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire_on_tokio_clock() {
        let store = InMemoryStore::new();
        store.set("k", "v", Some(2)).await.unwrap();

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryStore::new();
        assert!(!store.delete("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let store = InMemoryStore::new();
        store.hset("c:user", "1", "a").await.unwrap();
        store.hset("c:user", "2", "b").await.unwrap();

        assert_eq!(store.hget("c:user", "2").await.unwrap().as_deref(), Some("b"));
        assert!(store.hdel("c:user", "1").await.unwrap());
        assert!(!store.hdel("c:user", "1").await.unwrap());
        assert!(store.exists("c:user").await.unwrap());

        // last field gone → key gone
        assert!(store.hdel("c:user", "2").await.unwrap());
        assert!(!store.exists("c:user").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = InMemoryStore::new();
        store.set("s", "v", None).await.unwrap();
        store.hset("h", "f", "v").await.unwrap();

        assert!(matches!(store.hget("s", "f").await, Err(StorageError::WrongType { .. })));
        assert!(matches!(store.get("h").await, Err(StorageError::WrongType { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_applies_to_whole_hash() {
        let store = InMemoryStore::new();
        store.hset("g", "a", "1").await.unwrap();
        store.hset("g", "b", "2").await.unwrap();
        assert!(store.expire("g", 3).await.unwrap());
        assert!(!store.expire("missing", 3).await.unwrap());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.hget("g", "a").await.unwrap().is_none());
        assert!(store.hget("g", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_walks_cursor_in_batches() {
        let store = InMemoryStore::new();
        for i in 0..25 {
            store.set(&format!("c:user:{:02}", i), "v", None).await.unwrap();
        }
        store.set("c:order:1", "v", None).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        let mut calls = 0;
        loop {
            let (next, batch) = store.scan(cursor, "c:user:*", 10).await.unwrap();
            seen.extend(batch);
            calls += 1;
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        assert_eq!(seen.len(), 25);
        assert_eq!(calls, 3);
        assert!(seen.iter().all(|k| k.starts_with("c:user:")));
    }

    #[tokio::test]
    async fn test_deleting_during_scan_skips_nothing() {
        let store = InMemoryStore::new();
        for i in 0..20 {
            store.set(&format!("k{}", i), "v", None).await.unwrap();
        }

        let mut cursor = 0;
        let mut deleted = 0;
        loop {
            let (next, batch) = store.scan(cursor, "k*", 6).await.unwrap();
            deleted += store.delete_many(&batch).await.unwrap();
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        assert_eq!(deleted, 20);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let store = InMemoryStore::new();
        let mut a = store.subscribe(&["t1".into()]).await.unwrap();
        let mut b = store.subscribe(&["t1".into(), "t2".into()]).await.unwrap();

        assert_eq!(store.publish("t1", "hello").await.unwrap(), 2);
        assert_eq!(store.publish("t2", "only-b").await.unwrap(), 1);
        assert_eq!(store.publish("t3", "nobody").await.unwrap(), 0);

        assert_eq!(a.recv().await.unwrap().payload, "hello");
        assert_eq!(b.recv().await.unwrap().payload, "hello");
        assert_eq!(b.recv().await.unwrap().channel, "t2");
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = InMemoryStore::new();
        let rx = store.subscribe(&["t".into()]).await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(rx);
        assert_eq!(store.publish("t", "x").await.unwrap(), 0);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store_clone
                        .hset("group", &format!("{}-{}", batch, i), "v")
                        .await
                        .unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let (_, keys) = store.scan(0, "*", 10).await.unwrap();
        assert_eq!(keys, vec!["group".to_string()]);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("c:user:*", "c:user:42"));
        assert!(glob_match("c:user:*", "c:user:"));
        assert!(!glob_match("c:user:*", "c:users:42"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("lit\\*", "lit*"));
        assert!(!glob_match("lit\\*", "litx"));
        assert!(glob_match("*", ""));
    }
}
