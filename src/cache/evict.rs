// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flat-key eviction.
//!
//! Single-key mode deletes `<prefix>:<group>:<key>`. All-entries mode walks
//! `<prefix>:<group>:*` with cursor SCAN and deletes in batches of
//! `cache.scan_count`, so no blocking full-keyspace listing is ever issued.
//!
//! Eviction never fails the call: errors are logged and the operation's own
//! outcome is returned.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::expr::EvalContext;
use crate::metrics::{self, LatencyTimer};
use crate::policy::{Evict, Invocation, PolicyContext, PolicyKind};
use crate::storage::StorageError;

const POLICY: PolicyKind = PolicyKind::Evict;

#[derive(Clone)]
pub struct Evictor {
    ctx: PolicyContext,
}

impl Evictor {
    pub fn new(ctx: PolicyContext) -> Self {
        Self { ctx }
    }

    /// Run `proceed` with eviction before it (`before_invoke`) or after it
    /// returns successfully.
    pub async fn call<T, E, F, Fut>(&self, policy: &Evict, inv: &Invocation, proceed: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _timer = LatencyTimer::new(POLICY.as_str());

        if !self.ctx.config.cache.enabled {
            debug!(group = %policy.group, "Cache disabled, skipping eviction");
            return proceed().await;
        }

        if policy.before_invoke {
            self.evict(policy, &inv.context()).await;
            return proceed().await;
        }

        let out = proceed().await?;
        self.evict(policy, &inv.context()).await;
        Ok(out)
    }

    /// Perform the eviction described by `policy` now. Returns the number
    /// of keys removed; failures are logged and count as zero.
    pub async fn evict(&self, policy: &Evict, args: &EvalContext) -> u64 {
        if policy.all_entries {
            let pattern = self.ctx.keys.group_pattern(&policy.group);
            return match self.scan_and_delete(&pattern).await {
                Ok(total) => {
                    info!(group = %policy.group, %pattern, deleted = total, "EVICT-ALL");
                    metrics::record_evicted("all_entries", total);
                    total
                }
                Err((total, e)) => {
                    warn!(group = %policy.group, %pattern, deleted = total, error = %e, "EVICT-ALL interrupted");
                    metrics::record_store_error("scan_delete");
                    metrics::record_evicted("all_entries", total);
                    total
                }
            };
        }

        let key = match self.ctx.evaluator.eval_key(&policy.key, args) {
            Ok(k) => self.ctx.keys.key(&policy.group, &k),
            Err(e) => {
                warn!(group = %policy.group, expr = %policy.key, error = %e, "Key evaluation failed, skipping eviction");
                return 0;
            }
        };

        match self.ctx.store.delete(&key).await {
            Ok(existed) => {
                info!(%key, existed, "EVICT-ONE");
                let removed = u64::from(existed);
                metrics::record_evicted("single", removed);
                removed
            }
            Err(e) => {
                warn!(%key, error = %e, "Eviction failed (ignored)");
                metrics::record_store_error("delete");
                0
            }
        }
    }

    /// Delete every key matching `pattern`, flushing a batch whenever it
    /// reaches `scan_count`. On error, returns what was deleted so far.
    async fn scan_and_delete(&self, pattern: &str) -> Result<u64, (u64, StorageError)> {
        let batch_size = self.ctx.config.cache.scan_count.max(1);
        let store = &self.ctx.store;
        let mut batch: Vec<String> = Vec::with_capacity(batch_size);
        let mut total = 0u64;
        let mut cursor = 0u64;

        loop {
            let (next, keys) = store
                .scan(cursor, pattern, batch_size)
                .await
                .map_err(|e| (total, e))?;

            for key in keys {
                batch.push(key);
                if batch.len() >= batch_size {
                    let removed = store.delete_many(&batch).await.map_err(|e| (total, e))?;
                    total += removed;
                    batch.clear();
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        if !batch.is_empty() {
            let removed = store.delete_many(&batch).await.map_err(|e| (total, e))?;
            total += removed;
        }
        Ok(total)
    }
}
