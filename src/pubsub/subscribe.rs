// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber registration and message dispatch.
//!
//! ```text
//! register (startup, &mut) ──► SubscriberRegistry
//!                                   │ freeze
//!                                   ▼
//! store message ──► per-topic worker ──► SubscribeDispatcher::dispatch
//!                                            │ decode envelope (malformed → drop)
//!                                            │ event filter / condition
//!                                            ▼
//!                                 handlers run concurrently,
//!                                 each with its own retry sequence
//! ```
//!
//! The registry is frozen into an `Arc` when dispatch starts, so workers
//! read it without locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use super::handler::MessageHandler;
use super::log_text;
use super::publish::json_type;
use crate::codec::CodecError;
use crate::expr::{is_blank, EvalContext};
use crate::keys::KeyBuilder;
use crate::metrics;
use crate::policy::{PolicyContext, PolicyKind, Subscribe};
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::StorageError;

/// Variable holding the envelope event in subscribe conditions.
pub const EVENT_VAR: &str = "event";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Handler '{handler}' declares {arity} parameters; subscribers take 0 or 1")]
    TooManyParameters { handler: String, arity: usize },
}

#[derive(Clone)]
struct Registration {
    policy: Subscribe,
    handler: Arc<dyn MessageHandler>,
}

/// Handlers by physical topic. Written during startup only.
#[derive(Clone)]
pub struct SubscriberRegistry {
    keys: KeyBuilder,
    routes: BTreeMap<String, Vec<Registration>>,
}

impl SubscriberRegistry {
    pub fn new(keys: KeyBuilder) -> Self {
        Self {
            keys,
            routes: BTreeMap::new(),
        }
    }

    /// Register a handler. Returns `Ok(false)` when the descriptor has no
    /// topic and was skipped.
    pub fn register(&mut self, policy: Subscribe, handler: Arc<dyn MessageHandler>) -> Result<bool, RegistrationError> {
        if handler.arity() > 1 {
            return Err(RegistrationError::TooManyParameters {
                handler: handler.name().to_string(),
                arity: handler.arity(),
            });
        }

        if is_blank(&policy.topic) {
            warn!(handler = handler.name(), "Empty topic, handler not registered");
            return Ok(false);
        }

        let topic = self.keys.topic(&policy.topic);
        info!(
            handler = handler.name(),
            %topic,
            event = if is_blank(&policy.event) { "(any)" } else { policy.event.as_str() },
            "Registered subscriber"
        );
        self.routes
            .entry(topic)
            .or_default()
            .push(Registration { policy, handler });
        Ok(true)
    }

    /// Physical topics with at least one handler.
    pub fn topics(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn handler_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Per-message tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub filtered: usize,
}

#[derive(Clone)]
pub struct SubscribeDispatcher {
    ctx: PolicyContext,
    routes: Arc<BTreeMap<String, Vec<Registration>>>,
    retry: RetryConfig,
}

impl SubscribeDispatcher {
    pub fn new(ctx: PolicyContext, registry: SubscriberRegistry) -> Self {
        let retry = RetryConfig::handler(&ctx.config.pubsub);
        Self {
            ctx,
            routes: Arc::new(registry.routes),
            retry,
        }
    }

    pub fn topics(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// Deliver one raw message received on `topic` to its handlers.
    ///
    /// A message that does not decode is dropped and the decode error is
    /// returned; handler failures are counted in the report.
    pub async fn dispatch(&self, topic: &str, raw: &str) -> Result<DispatchReport, CodecError> {
        let log_payload = self.ctx.config.pubsub.log_payload;

        let envelope = match Envelope::decode(self.ctx.codec.as_ref(), raw) {
            Ok(env) => env,
            Err(e) => {
                if log_payload {
                    error!(%topic, error = %e, raw = %log_text(raw), "Invalid message dropped");
                } else {
                    error!(%topic, error = %e, "Invalid message dropped (payload hidden)");
                }
                metrics::record_message_dropped("malformed");
                return Err(e);
            }
        };

        let mut report = DispatchReport::default();
        let Some(registrations) = self.routes.get(topic) else {
            debug!(%topic, "No handlers for topic");
            metrics::record_message_dropped("no_handler");
            return Ok(report);
        };

        let mut deliveries = Vec::with_capacity(registrations.len());
        for reg in registrations {
            if !self.accepts(reg, &envelope) {
                report.filtered += 1;
                continue;
            }
            deliveries.push(self.deliver(topic, reg, &envelope, raw));
        }

        for ok in join_all(deliveries).await {
            if ok {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    fn accepts(&self, reg: &Registration, envelope: &Envelope) -> bool {
        if !is_blank(&reg.policy.event) && reg.policy.event != envelope.event {
            return false;
        }
        if is_blank(&reg.policy.condition) {
            return true;
        }
        let ctx = EvalContext::new()
            .with_payload(envelope.payload.clone())
            .with_var(EVENT_VAR, Value::String(envelope.event.clone()));
        self.ctx.guard(PolicyKind::Subscribe, "condition", &reg.policy.condition, &ctx, true)
    }

    async fn deliver(&self, topic: &str, reg: &Registration, envelope: &Envelope, raw: &str) -> bool {
        let handler = reg.handler.as_ref();
        let operation = format!("handler '{}'", handler.name());

        match retry(&operation, &self.retry, || handler.handle(envelope)).await {
            Ok(()) => {
                if self.ctx.config.pubsub.log_payload {
                    info!(%topic, event = %envelope.event, handler = handler.name(), payload = %log_text(raw), "Handled");
                } else {
                    info!(
                        %topic,
                        event = %envelope.event,
                        handler = handler.name(),
                        payload_type = json_type(&envelope.payload),
                        "Handled"
                    );
                }
                metrics::record_handler_invocation("success");
                true
            }
            Err(e) => {
                error!(
                    %topic,
                    event = %envelope.event,
                    handler = handler.name(),
                    attempts = ?self.retry.max_attempts,
                    error = %e,
                    "Handler FAILED, message dropped"
                );
                metrics::record_handler_invocation("failure");
                false
            }
        }
    }

    /// Subscribe every registered topic and spawn one worker per topic.
    ///
    /// Does nothing when caching or pub/sub is disabled. If any topic fails
    /// to subscribe, the workers already spawned are stopped before the
    /// error is returned.
    pub async fn start(&self) -> Result<SubscriptionHandle, StorageError> {
        let cfg = &self.ctx.config;
        if !cfg.pubsub_active() {
            info!(
                cache_enabled = cfg.cache.enabled,
                pubsub_enabled = cfg.pubsub.enabled,
                "Pub/sub disabled, listeners not started"
            );
            return Ok(SubscriptionHandle::default());
        }

        let mut handle = SubscriptionHandle::default();
        for topic in self.routes.keys() {
            let mut rx = match self.ctx.store.subscribe(std::slice::from_ref(topic)).await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(%topic, error = %e, started = handle.topics.len(), "Subscribe failed, stopping listeners");
                    handle.shutdown();
                    return Err(e);
                }
            };
            let dispatcher = self.clone();
            let worker_topic = topic.clone();
            handle.tasks.push(tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    // outcome already logged and counted
                    let _ = dispatcher.dispatch(&msg.channel, &msg.payload).await;
                }
                debug!(topic = %worker_topic, "Subscription closed, worker exiting");
            }));
            handle.topics.push(topic.clone());
            info!(%topic, "Listening");
        }
        metrics::set_subscribed_topics(handle.topics.len());
        Ok(handle)
    }
}

/// Running listener workers. Dropping the handle leaves them running;
/// call [`SubscriptionHandle::shutdown`] to stop them.
#[derive(Default)]
pub struct SubscriptionHandle {
    topics: Vec<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        metrics::set_subscribed_topics(0);
    }
}
