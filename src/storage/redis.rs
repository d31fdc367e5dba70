// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis backend.
//!
//! Commands go through a shared [`ConnectionManager`]. Each `subscribe` call
//! opens its own pub/sub connection on a background task; when that
//! connection drops, the task reconnects with the daemon retry preset and
//! resubscribes, so listeners survive a Redis restart.
//!
//! Keys are used exactly as given: namespacing is the key builder's job.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::traits::{KeyTtl, KvStore, StorageError, StoreMessage};
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect, retrying with the startup preset before giving up.
    pub async fn connect(connection_string: &str) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        info!("Connected to Redis");
        Ok(Self { client, connection })
    }

    /// Get a clone of the connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let mut command = cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl_secs.filter(|t| *t > 0) {
            command.arg("EX").arg(ttl);
        }
        command.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let removed: u64 = cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let removed: u64 = cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let found: bool = cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>), StorageError> {
        let mut conn = self.connection.clone();
        let (next, batch): (u64, Vec<String>) = cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to scan '{}': {}", pattern, e)))?;
        Ok((next, batch))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = cmd("HGET").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let removed: u64 = cmd("HDEL").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let applied: bool = cmd("EXPIRE").arg(key).arg(ttl_secs).query_async(&mut conn).await?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StorageError> {
        let mut conn = self.connection.clone();
        let ttl: i64 = cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(match ttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            secs => KeyTtl::Seconds(secs.max(0) as u64),
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StorageError> {
        let mut conn = self.connection.clone();
        let receivers: u64 = cmd("PUBLISH").arg(channel).arg(payload).query_async(&mut conn).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<mpsc::UnboundedReceiver<StoreMessage>, StorageError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let channels = channels.to_vec();

        // First connection fails fast so a bad setup surfaces to the caller.
        let first = open_pubsub(&client, &channels, &RetryConfig::startup()).await?;
        tokio::spawn(pump_messages(client, channels, first, tx));

        Ok(rx)
    }
}

async fn open_pubsub(
    client: &Client,
    channels: &[String],
    config: &RetryConfig,
) -> Result<redis::aio::PubSub, StorageError> {
    retry("redis_subscribe", config, move || async move {
        let mut pubsub = client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }
        Ok::<_, redis::RedisError>(pubsub)
    })
    .await
    .map_err(StorageError::from)
}

/// Forward messages until the receiver is dropped, reconnecting whenever
/// the pub/sub stream ends. A dropped receiver is noticed right away, even
/// while the channel is idle or a reconnect is in progress.
async fn pump_messages(
    client: Client,
    channels: Vec<String>,
    first: redis::aio::PubSub,
    tx: mpsc::UnboundedSender<StoreMessage>,
) {
    let mut pubsub = Some(first);
    loop {
        let conn = match pubsub.take() {
            Some(conn) => conn,
            None => {
                let daemon_retry = RetryConfig::daemon();
                let reopened = tokio::select! {
                    _ = tx.closed() => {
                        debug!(channels = ?channels, "Subscriber gone during reconnect");
                        return;
                    }
                    res = open_pubsub(&client, &channels, &daemon_retry) => res,
                };
                match reopened {
                    Ok(conn) => {
                        info!(channels = ?channels, "Pub/sub connection restored");
                        conn
                    }
                    Err(e) => {
                        // Only reachable if the daemon preset is ever bounded
                        error!(error = %e, "Giving up on pub/sub reconnection");
                        return;
                    }
                }
            }
        };

        let mut stream = conn.into_on_message();
        loop {
            let msg = tokio::select! {
                _ = tx.closed() => {
                    debug!(channels = ?channels, "Subscriber gone, closing pub/sub connection");
                    return;
                }
                next = stream.next() => match next {
                    Some(msg) => msg,
                    None => break,
                },
            };
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(channel = %msg.get_channel_name(), error = %e, "Non-text pub/sub payload dropped");
                    continue;
                }
            };
            let forwarded = tx.send(StoreMessage {
                channel: msg.get_channel_name().to_string(),
                payload,
            });
            if forwarded.is_err() {
                debug!("Subscriber gone, closing pub/sub connection");
                return;
            }
        }

        if tx.is_closed() {
            return;
        }
        warn!(channels = ?channels, "Pub/sub stream ended, reconnecting");
    }
}
