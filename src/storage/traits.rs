// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("WRONGTYPE operation against key '{key}' holding the wrong kind of value")]
    WrongType { key: String },
    #[error("Subscription closed")]
    SubscriptionClosed,
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        StorageError::Backend(e.to_string())
    }
}

/// A message delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
    pub channel: String,
    pub payload: String,
}

/// Remaining lifetime of a key, as reported by `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Seconds(u64),
}

/// The remote key-value store the policies sit in front of.
///
/// Implementations must be safe for concurrent use; policies share one
/// instance across every intercepted call and the subscriber listener.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Set a string value. `None` (or zero) leaves the key without expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StorageError>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete several keys, returning how many existed.
    /// Default implementation falls back to sequential deletes.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, StorageError> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// One step of a cursor-based scan: returns the next cursor (0 when the
    /// iteration is complete) and up to roughly `count` matching keys.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>), StorageError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;
    /// Returns true if the field existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError>;

    /// Expire the whole key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StorageError>;
    async fn ttl(&self, key: &str) -> Result<KeyTtl, StorageError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StorageError>;

    /// Subscribe to channels; messages arrive on the returned receiver until
    /// it is dropped.
    async fn subscribe(&self, channels: &[String]) -> Result<mpsc::UnboundedReceiver<StoreMessage>, StorageError>;
}
