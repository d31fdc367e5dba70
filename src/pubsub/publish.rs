// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event publication after a successful operation.
//!
//! Publishing is synchronous with the caller: the decorated call returns only
//! after the publish has succeeded or exhausted its retries. The outcome
//! never changes what the caller sees.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use super::log_text;
use crate::codec::to_value;
use crate::expr::is_blank;
use crate::metrics::{self, LatencyTimer};
use crate::policy::{Invocation, PolicyContext, PolicyKind, Publish};
use crate::resilience::retry::{retry, RetryConfig};

const POLICY: PolicyKind = PolicyKind::Publish;

/// What happened to one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Disabled,
    ConditionFalse,
    EmptyTopic,
    EncodeFailed,
    Delivered { receivers: u64, attempts: usize },
    Failed { attempts: usize },
}

#[derive(Clone)]
pub struct Publisher {
    ctx: PolicyContext,
    retry: RetryConfig,
}

impl Publisher {
    pub fn new(ctx: PolicyContext) -> Self {
        let retry = RetryConfig::publish(&ctx.config.pubsub);
        Self { ctx, retry }
    }

    /// Run `proceed`, then publish its result. Operation errors skip the
    /// publish and propagate.
    pub async fn call<T, E, F, Fut>(&self, policy: &Publish, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let _timer = LatencyTimer::new(POLICY.as_str());
        let result = proceed().await?;
        self.publish_result(policy, inv, &result).await;
        Ok(result)
    }

    /// Publish for an already computed result.
    pub async fn publish_result<T: Serialize>(&self, policy: &Publish, inv: &Invocation, result: &Option<T>) -> PublishOutcome {
        let cfg = &self.ctx.config;
        if !cfg.pubsub_active() {
            return PublishOutcome::Disabled;
        }

        let result_value = match to_value(result) {
            Ok(v) => v,
            Err(e) => {
                warn!(topic = %policy.topic, error = %e, "Result not serializable, exposed as null");
                Value::Null
            }
        };
        let args = inv.context().with_result(result_value);

        if !self.ctx.guard(POLICY, "condition", &policy.condition, &args, true) {
            debug!(topic = %policy.topic, "Condition false, skipping publish");
            metrics::record_publish("skipped");
            return PublishOutcome::ConditionFalse;
        }

        if is_blank(&policy.topic) {
            warn!(event = %policy.event, "Empty topic, skipping publish");
            metrics::record_publish("skipped");
            return PublishOutcome::EmptyTopic;
        }
        let topic = self.ctx.keys.topic(&policy.topic);

        let payload = if is_blank(&policy.payload) {
            Value::Null
        } else {
            match self.ctx.evaluator.eval(&policy.payload, &args) {
                Ok(v) => v,
                Err(e) => {
                    warn!(%topic, expr = %policy.payload, error = %e, "Payload evaluation failed, publishing null");
                    Value::Null
                }
            }
        };

        let envelope = Envelope::new(policy.event.clone(), cfg.application_name.clone(), payload);
        let raw = match envelope.encode(self.ctx.codec.as_ref()) {
            Ok(raw) => raw,
            Err(e) => {
                // Retrying cannot fix a payload that does not encode.
                error!(%topic, event = %policy.event, error = %e, "Envelope encode failed");
                metrics::record_publish("encode_failed");
                return PublishOutcome::EncodeFailed;
            }
        };

        let store = self.ctx.store.as_ref();
        let attempts = AtomicUsize::new(0);
        let sent = retry("publish", &self.retry, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            store.publish(&topic, &raw)
        })
        .await;
        let attempts = attempts.into_inner();

        match sent {
            Ok(receivers) => {
                if cfg.pubsub.log_payload {
                    info!(%topic, event = %policy.event, receivers, payload = %log_text(&raw), "Published");
                } else {
                    info!(%topic, event = %policy.event, receivers, payload_type = json_type(&envelope.payload), "Published");
                }
                metrics::record_publish("success");
                PublishOutcome::Delivered { receivers, attempts }
            }
            Err(e) => {
                error!(%topic, event = %policy.event, attempts, error = %e, "Publish FAILED, giving up");
                metrics::record_publish("failure");
                PublishOutcome::Failed { attempts }
            }
        }
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
