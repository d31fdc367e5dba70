// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-through caching of flat keys.
//!
//! ```text
//! disabled / condition false / key error / store read error
//!         │
//!         └──► proceed, no store traffic after the failure
//!
//! hit  ──► null marker → Ok(None)
//!      ──► decodes     → Ok(Some(value))
//!      ──► decode error ─┐
//! miss ──────────────────┴─► proceed ─► unless? ─► write (value | marker | skip)
//! ```
//!
//! The operation runs at most once per call, and its errors are returned
//! untouched. Store failures never reach the caller.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec::{decode_as, to_value, NULL_MARKER};
use crate::expr::is_blank;
use crate::metrics::{self, LatencyTimer};
use crate::policy::{Cacheable, Invocation, PolicyContext, PolicyKind};

const POLICY: PolicyKind = PolicyKind::ReadThrough;

#[derive(Clone)]
pub struct ReadThroughCache {
    ctx: PolicyContext,
}

impl ReadThroughCache {
    pub fn new(ctx: PolicyContext) -> Self {
        Self { ctx }
    }

    /// Run `proceed` behind the read-through policy described by `policy`.
    pub async fn call<T, E, F, Fut>(&self, policy: &Cacheable, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let _timer = LatencyTimer::new(POLICY.as_str());
        let cfg = &self.ctx.config.cache;

        if !cfg.enabled {
            debug!(group = %policy.group, "Cache disabled, bypassing");
            metrics::record_cache_request(POLICY.as_str(), "bypass");
            return proceed().await;
        }

        let args = inv.context();
        if !self.ctx.guard(POLICY, "condition", &policy.condition, &args, true) {
            debug!(group = %policy.group, "Condition false, bypassing");
            metrics::record_cache_request(POLICY.as_str(), "bypass");
            return proceed().await;
        }

        let key = match self.ctx.evaluator.eval_key(&policy.key, &args) {
            Ok(k) => self.ctx.keys.key(&policy.group, &k),
            Err(e) => {
                warn!(group = %policy.group, expr = %policy.key, error = %e, "Key evaluation failed, bypassing");
                metrics::record_cache_request(POLICY.as_str(), "bypass");
                return proceed().await;
            }
        };

        let ttl = if policy.ttl_secs > 0 { policy.ttl_secs } else { cfg.default_ttl_secs };

        match self.ctx.store.get(&key).await {
            Err(e) => {
                warn!(%key, error = %e, "Store read failed, bypassing");
                metrics::record_store_error("get");
                metrics::record_cache_request(POLICY.as_str(), "bypass");
                return proceed().await;
            }
            Ok(Some(raw)) if raw == NULL_MARKER => {
                info!(%key, "Cache HIT (cached null)");
                metrics::record_cache_request(POLICY.as_str(), "cached_null");
                return Ok(None);
            }
            Ok(Some(raw)) => match decode_as::<T>(self.ctx.codec.as_ref(), &raw) {
                Ok(value) => {
                    info!(%key, "Cache HIT");
                    metrics::record_cache_request(POLICY.as_str(), "hit");
                    return Ok(Some(value));
                }
                Err(e) => {
                    warn!(%key, error = %e, "Cached value undecodable, treating as miss");
                }
            },
            Ok(None) => debug!(%key, "Cache MISS"),
        }

        metrics::record_cache_request(POLICY.as_str(), "miss");
        let result = proceed().await?;

        let value = match to_value(&result) {
            Ok(v) => v,
            Err(e) => {
                warn!(%key, error = %e, "Result not encodable, skipping write");
                return Ok(result);
            }
        };

        if !is_blank(&policy.unless) {
            let with_result = args.with_result(value.clone());
            if self.ctx.guard(POLICY, "unless", &policy.unless, &with_result, false) {
                debug!(%key, "Unless matched, skipping write");
                return Ok(result);
            }
        }

        self.write(policy, &key, &value, ttl).await;
        Ok(result)
    }

    async fn write(&self, policy: &Cacheable, key: &str, value: &Value, ttl: u64) {
        let cfg = &self.ctx.config.cache;

        let (raw, ttl) = if value.is_null() {
            if !policy.cache_null.unwrap_or(cfg.cache_null) {
                debug!(%key, "Null result, null caching off");
                return;
            }
            (NULL_MARKER.to_string(), cfg.null_ttl_secs)
        } else {
            match self.ctx.codec.encode(value) {
                Ok(raw) => (raw, ttl),
                Err(e) => {
                    warn!(%key, error = %e, "Encode failed, skipping write");
                    return;
                }
            }
        };

        match self.ctx.store.set(key, &raw, Some(ttl)).await {
            Ok(()) => info!(%key, ttl, "Cache SET"),
            Err(e) => {
                warn!(%key, error = %e, "Store write failed, result still returned");
                metrics::record_store_error("set");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::config::CachewireConfig;
    use crate::storage::{InMemoryStore, KeyTtl, KvStore};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        name: String,
    }

    fn setup(config: CachewireConfig) -> (ReadThroughCache, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ctx = PolicyContext::new(config, store.clone(), Arc::new(JsonCodec));
        (ReadThroughCache::new(ctx), store)
    }

    fn config(prefix: &str) -> CachewireConfig {
        let mut config = CachewireConfig::default();
        config.cache.prefix = prefix.into();
        config
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").ttl_secs(60);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let inv = Invocation::new().arg("id", "42");
            let user = cache
                .call(&policy, &inv, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(Some(User { id: "42".into(), name: "Ann".into() }))
                })
                .await
                .unwrap();
            assert_eq!(user.unwrap().name, "Ann");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("c:user:42").await.unwrap().as_deref(),
            Some(r#"{"id":"42","name":"Ann"}"#)
        );
        assert_eq!(store.ttl("c:user:42").await.unwrap(), KeyTtl::Seconds(60));
    }

    #[tokio::test]
    async fn test_zero_ttl_uses_default() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#p0");
        let inv = Invocation::new().arg("id", &7);

        cache.call(&policy, &inv, || async { Ok::<_, String>(Some(1)) }).await.unwrap();
        assert_eq!(store.ttl("c:user:7").await.unwrap(), KeyTtl::Seconds(300));
    }

    #[tokio::test]
    async fn test_operation_error_propagates_and_nothing_is_written() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id");
        let inv = Invocation::new().arg("id", "1");

        let err = cache
            .call(&policy, &inv, || async { Err::<Option<u32>, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_null_not_cached_by_default() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id");
        let inv = Invocation::new().arg("id", "1");

        let out = cache.call(&policy, &inv, || async { Ok::<Option<u32>, String>(None) }).await.unwrap();
        assert!(out.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cached_null_is_a_hit() {
        let mut cfg = config("c");
        cfg.cache.cache_null = true;
        cfg.cache.null_ttl_secs = 15;
        let (cache, store) = setup(cfg);
        let policy = Cacheable::new("user", "#id");
        let inv = Invocation::new().arg("id", "1");
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let out = cache
                .call(&policy, &inv, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<Option<u32>, String>(None)
                })
                .await
                .unwrap();
            assert!(out.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("c:user:1").await.unwrap().as_deref(), Some(NULL_MARKER));
        assert_eq!(store.ttl("c:user:1").await.unwrap(), KeyTtl::Seconds(15));
    }

    #[tokio::test]
    async fn test_descriptor_overrides_null_caching() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").cache_null(true);
        let inv = Invocation::new().arg("id", "1");

        cache.call(&policy, &inv, || async { Ok::<Option<u32>, String>(None) }).await.unwrap();
        assert!(store.exists("c:user:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_condition_false_bypasses() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").condition("#id != 'skip'");
        let inv = Invocation::new().arg("id", "skip");

        cache.call(&policy, &inv, || async { Ok::<_, String>(Some(1)) }).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_condition_error_fails_open() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").condition("#missing.field");
        let inv = Invocation::new().arg("id", "1");

        cache.call(&policy, &inv, || async { Ok::<_, String>(Some(1)) }).await.unwrap();
        assert!(store.exists("c:user:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unless_vetoes_write() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").unless("#result.name == 'Ann'");
        let inv = Invocation::new().arg("id", "42");

        cache
            .call(&policy, &inv, || async {
                Ok::<_, String>(Some(User { id: "42".into(), name: "Ann".into() }))
            })
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unless_error_still_writes() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id").unless("#result.a.b == 1");
        let inv = Invocation::new().arg("id", "42");

        cache.call(&policy, &inv, || async { Ok::<_, String>(Some(json_user())) }).await.unwrap();
        assert!(store.exists("c:user:42").await.unwrap());
    }

    fn json_user() -> User {
        User { id: "42".into(), name: "Bo".into() }
    }

    #[tokio::test]
    async fn test_key_error_bypasses() {
        let (cache, store) = setup(config("c"));
        let policy = Cacheable::new("user", "#id +");
        let inv = Invocation::new().arg("id", "42");

        let out = cache.call(&policy, &inv, || async { Ok::<_, String>(Some(5)) }).await.unwrap();
        assert_eq!(out, Some(5));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_hit_falls_back_to_miss() {
        let (cache, store) = setup(config("c"));
        store.set("c:user:42", r#"{"legacy":true}"#, None).await.unwrap();
        let policy = Cacheable::new("user", "#id");
        let inv = Invocation::new().arg("id", "42");

        let out = cache.call(&policy, &inv, || async { Ok::<_, String>(Some(json_user())) }).await.unwrap();
        assert_eq!(out, Some(json_user()));
        assert_eq!(
            store.get("c:user:42").await.unwrap().as_deref(),
            Some(r#"{"id":"42","name":"Bo"}"#)
        );
    }

    #[tokio::test]
    async fn test_disabled_never_touches_store() {
        let mut cfg = config("c");
        cfg.cache.enabled = false;
        let (cache, store) = setup(cfg);
        let policy = Cacheable::new("user", "#id");
        let inv = Invocation::new().arg("id", "42");

        cache.call(&policy, &inv, || async { Ok::<_, String>(Some(1)) }).await.unwrap();
        assert!(store.is_empty());
    }
}
