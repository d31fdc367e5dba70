// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Policy engine facade.
//!
//! The [`PolicyEngine`] wires one configuration, store, and codec into every
//! policy and exposes them as decorators.
//!
//! # Lifecycle
//!
//! ```text
//! Registering ──start_subscribers()──► Running
//! ```
//!
//! Subscribers can only be added while registering; the handler table is
//! frozen when listeners start. Cache and publish decorators work in both
//! states.
//!
//! # Example
//!
//! ```rust
//! use cachewire::{CachewireConfig, PolicyEngine};
//! use cachewire::policy::{Cacheable, Invocation};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = PolicyEngine::in_memory(CachewireConfig::default());
//! let policy = Cacheable::new("user", "#id").ttl_secs(60);
//!
//! let name = engine
//!     .cacheable(&policy, &Invocation::new().arg("id", "42"), || async {
//!         Ok::<_, std::io::Error>(Some("Ann".to_string()))
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(name.as_deref(), Some("Ann"));
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cache::{Evictor, HashCache, ReadThroughCache};
use crate::codec::{Codec, JsonCodec};
use crate::config::{CachewireConfig, ConfigError};
use crate::policy::{Cacheable, Evict, HashEvict, HashGet, HashPut, Invocation, PolicyContext, Publish, Subscribe};
use crate::pubsub::{
    MessageHandler, PublishOutcome, Publisher, RegistrationError, SubscribeDispatcher, SubscriberRegistry,
    SubscriptionHandle,
};
use crate::storage::{InMemoryStore, KvStore, RedisStore, StorageError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("Subscribers already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Registering,
    Running,
}

pub struct PolicyEngine {
    ctx: PolicyContext,
    read_through: ReadThroughCache,
    evictor: Evictor,
    hash: HashCache,
    publisher: Publisher,
    registry: Option<SubscriberRegistry>,
    topics: Vec<String>,
}

impl PolicyEngine {
    pub fn new(config: CachewireConfig, store: Arc<dyn KvStore>, codec: Arc<dyn Codec>) -> Self {
        let ctx = PolicyContext::new(config, store, codec);
        Self {
            read_through: ReadThroughCache::new(ctx.clone()),
            evictor: Evictor::new(ctx.clone()),
            hash: HashCache::new(ctx.clone()),
            publisher: Publisher::new(ctx.clone()),
            registry: Some(SubscriberRegistry::new(ctx.keys.clone())),
            topics: Vec::new(),
            ctx,
        }
    }

    /// Engine over a process-local store with the JSON codec.
    pub fn in_memory(config: CachewireConfig) -> Self {
        Self::new(config, Arc::new(InMemoryStore::new()), Arc::new(JsonCodec))
    }

    /// Validate `config` and connect to `redis_url`.
    pub async fn connect(config: CachewireConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let url = config.redis_url.clone().ok_or(ConfigError::Invalid {
            field: "redis_url",
            reason: "required to connect".into(),
        })?;
        let store = RedisStore::connect(&url).await?;
        info!(application = %config.application_name, prefix = %config.cache.prefix, "Policy engine connected");
        Ok(Self::new(config, Arc::new(store), Arc::new(JsonCodec)))
    }

    pub fn context(&self) -> &PolicyContext {
        &self.ctx
    }

    pub fn config(&self) -> &CachewireConfig {
        &self.ctx.config
    }

    pub fn state(&self) -> EngineState {
        if self.registry.is_some() {
            EngineState::Registering
        } else {
            EngineState::Running
        }
    }

    pub async fn cacheable<T, E, F, Fut>(&self, policy: &Cacheable, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.read_through.call(policy, inv, proceed).await
    }

    pub async fn evict<T, E, F, Fut>(&self, policy: &Evict, inv: &Invocation, proceed: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.evictor.call(policy, inv, proceed).await
    }

    pub async fn hash_get<T, E, F, Fut>(&self, policy: &HashGet, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.hash.get(policy, inv, proceed).await
    }

    pub async fn hash_put<T, E, F, Fut>(&self, policy: &HashPut, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.hash.put(policy, inv, proceed).await
    }

    pub async fn hash_evict<T, E, F, Fut>(&self, policy: &HashEvict, inv: &Invocation, proceed: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.hash.evict(policy, inv, proceed).await
    }

    pub async fn publish<T, E, F, Fut>(&self, policy: &Publish, inv: &Invocation, proceed: F) -> Result<Option<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.publisher.call(policy, inv, proceed).await
    }

    /// Publish for a result computed outside a decorator.
    pub async fn publish_result<T: Serialize>(&self, policy: &Publish, inv: &Invocation, result: &Option<T>) -> PublishOutcome {
        self.publisher.publish_result(policy, inv, result).await
    }

    /// Register a subscriber. Returns `Ok(false)` if skipped for an empty topic.
    pub fn subscribe(&mut self, policy: Subscribe, handler: Arc<dyn MessageHandler>) -> Result<bool, EngineError> {
        let registry = self.registry.as_mut().ok_or(EngineError::AlreadyStarted)?;
        Ok(registry.register(policy, handler)?)
    }

    /// Physical topics that have subscribers.
    pub fn subscriptions(&self) -> Vec<String> {
        match &self.registry {
            Some(registry) => registry.topics(),
            None => self.topics.clone(),
        }
    }

    /// Freeze the handler table and start one listener per topic.
    ///
    /// On failure no listener is left running and the engine stays in
    /// [`EngineState::Registering`], so startup can be retried.
    pub async fn start_subscribers(&mut self) -> Result<SubscriptionHandle, EngineError> {
        let registry = self.registry.as_ref().ok_or(EngineError::AlreadyStarted)?;
        let topics = registry.topics();
        let dispatcher = SubscribeDispatcher::new(self.ctx.clone(), registry.clone());
        let handle = dispatcher.start().await?;

        self.registry = None;
        self.topics = topics;
        Ok(handle)
    }
}
