// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Grouped caching: many fields inside one `<prefix>:<group>` hash.
//!
//! TTL lives on the hash, not the field, so a group expires as a unit.
//! Only [`HashCache::put`] touches the TTL; a read-populated field inherits
//! whatever expiry the hash already has.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{decode_as, encode_as, NULL_MARKER};
use crate::expr::{is_blank, EvalContext};
use crate::metrics::{self, LatencyTimer};
use crate::policy::{HashEvict, HashGet, HashPut, Invocation, PolicyContext, PolicyKind};

#[derive(Clone)]
pub struct HashCache {
    ctx: PolicyContext,
}

impl HashCache {
    pub fn new(ctx: PolicyContext) -> Self {
        Self { ctx }
    }

    /// Evaluate a field expression. `None` (null result or error) means the
    /// call goes uncached.
    fn field(&self, policy: PolicyKind, group: &str, expr: &str, args: &EvalContext) -> Option<String> {
        match self.ctx.evaluator.eval_string(expr, args) {
            Ok(Some(field)) => Some(field),
            Ok(None) => {
                debug!(%policy, group, expr, "Field evaluated to nothing, bypassing");
                None
            }
            Err(e) => {
                warn!(%policy, group, expr, error = %e, "Field evaluation failed, bypassing");
                None
            }
        }
    }

    pub async fn get<T, E, F, Fut>(&self, policy: &HashGet, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        const POLICY: PolicyKind = PolicyKind::GroupedGet;
        let _timer = LatencyTimer::new(POLICY.as_str());

        if !self.ctx.config.cache.enabled {
            metrics::record_cache_request(POLICY.as_str(), "bypass");
            return proceed().await;
        }

        let hash_key = self.ctx.keys.group_key(&policy.group);
        let Some(field) = self.field(POLICY, &policy.group, &policy.field, &inv.context()) else {
            metrics::record_cache_request(POLICY.as_str(), "bypass");
            return proceed().await;
        };

        match self.ctx.store.hget(&hash_key, &field).await {
            Err(e) => {
                warn!(%hash_key, %field, error = %e, "Store read failed, bypassing");
                metrics::record_store_error("hget");
                metrics::record_cache_request(POLICY.as_str(), "bypass");
                return proceed().await;
            }
            Ok(Some(raw)) if raw == NULL_MARKER => {
                info!(%hash_key, %field, "Hash HIT (cached null)");
                metrics::record_cache_request(POLICY.as_str(), "cached_null");
                return Ok(None);
            }
            Ok(Some(raw)) => match decode_as::<T>(self.ctx.codec.as_ref(), &raw) {
                Ok(value) => {
                    info!(%hash_key, %field, "Hash HIT");
                    metrics::record_cache_request(POLICY.as_str(), "hit");
                    return Ok(Some(value));
                }
                Err(e) => warn!(%hash_key, %field, error = %e, "Cached field undecodable, treating as miss"),
            },
            Ok(None) => debug!(%hash_key, %field, "Hash MISS"),
        }

        metrics::record_cache_request(POLICY.as_str(), "miss");
        let result = proceed().await?;

        if let Some(value) = &result {
            match encode_as(self.ctx.codec.as_ref(), value) {
                Ok(raw) => {
                    if let Err(e) = self.ctx.store.hset(&hash_key, &field, &raw).await {
                        warn!(%hash_key, %field, error = %e, "Store write failed, result still returned");
                        metrics::record_store_error("hset");
                    }
                }
                Err(e) => warn!(%hash_key, %field, error = %e, "Encode failed, skipping write"),
            }
        }
        Ok(result)
    }

    pub async fn put<T, E, F, Fut>(&self, policy: &HashPut, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        const POLICY: PolicyKind = PolicyKind::GroupedPut;
        let _timer = LatencyTimer::new(POLICY.as_str());

        if !self.ctx.config.cache.enabled {
            return proceed().await;
        }

        let result = proceed().await?;

        let hash_key = self.ctx.keys.group_key(&policy.group);
        let Some(field) = self.field(POLICY, &policy.group, &policy.field, &inv.context()) else {
            return Ok(result);
        };

        let raw = match &result {
            None => NULL_MARKER.to_string(),
            Some(value) => match encode_as(self.ctx.codec.as_ref(), value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(%hash_key, %field, error = %e, "Encode failed, skipping write");
                    return Ok(result);
                }
            },
        };

        if let Err(e) = self.ctx.store.hset(&hash_key, &field, &raw).await {
            warn!(%hash_key, %field, error = %e, "Store write failed, result still returned");
            metrics::record_store_error("hset");
            return Ok(result);
        }

        let ttl = if policy.ttl_secs > 0 {
            policy.ttl_secs
        } else {
            self.ctx.config.cache.default_ttl_secs
        };
        if ttl > 0 {
            if let Err(e) = self.ctx.store.expire(&hash_key, ttl).await {
                warn!(%hash_key, ttl, error = %e, "Setting group TTL failed");
                metrics::record_store_error("expire");
            }
        }

        info!(%hash_key, %field, ttl, "Hash PUT");
        Ok(result)
    }

    pub async fn evict<T, E, F, Fut>(&self, policy: &HashEvict, inv: &Invocation, proceed: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _timer = LatencyTimer::new(PolicyKind::GroupedEvict.as_str());

        if !self.ctx.config.cache.enabled {
            return proceed().await;
        }

        if policy.before_invoke {
            self.evict_now(policy, &inv.context()).await;
            return proceed().await;
        }

        let out = proceed().await?;
        self.evict_now(policy, &inv.context()).await;
        Ok(out)
    }

    /// Returns true if anything was removed.
    pub async fn evict_now(&self, policy: &HashEvict, args: &EvalContext) -> bool {
        let hash_key = self.ctx.keys.group_key(&policy.group);

        if policy.all_entries {
            return match self.ctx.store.delete(&hash_key).await {
                Ok(existed) => {
                    info!(%hash_key, existed, "Hash EVICT-ALL");
                    metrics::record_evicted("group", u64::from(existed));
                    existed
                }
                Err(e) => {
                    warn!(%hash_key, error = %e, "Eviction failed (ignored)");
                    metrics::record_store_error("delete");
                    false
                }
            };
        }

        if is_blank(&policy.field) {
            return false;
        }
        let Some(field) = self.field(PolicyKind::GroupedEvict, &policy.group, &policy.field, args) else {
            return false;
        };

        match self.ctx.store.hdel(&hash_key, &field).await {
            Ok(existed) => {
                info!(%hash_key, %field, existed, "Hash EVICT");
                metrics::record_evicted("field", u64::from(existed));
                existed
            }
            Err(e) => {
                warn!(%hash_key, %field, error = %e, "Eviction failed (ignored)");
                metrics::record_store_error("hdel");
                false
            }
        }
    }
}
