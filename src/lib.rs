//! # Cachewire
//!
//! Declarative caching and publish/subscribe policies in front of a shared
//! key-value store (Redis, or an in-process store for tests).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Intercepted operation                   │
//! │  • Wrapped by a decorator taking a `proceed` closure        │
//! │  • Its own errors always propagate unchanged                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Policies                            │
//! │  • Read-through, evict, grouped hash get/put/evict          │
//! │  • Publish after success, subscribe with bounded retry      │
//! │  • Keys/conditions/payloads from small expressions          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      KvStore + Codec                        │
//! │  • Store failures degrade to "compute fresh"                │
//! │  • JSON on the wire, null marker for cached nulls           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachewire::{CachewireConfig, PolicyEngine};
//! use cachewire::policy::{Cacheable, Evict, Invocation, Publish};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CachewireConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!     let engine = PolicyEngine::connect(config).await.expect("Failed to connect");
//!
//!     let read = Cacheable::new("user", "#id").ttl_secs(60);
//!     let inv = Invocation::new().arg("id", "42");
//!
//!     // Second call is served from Redis
//!     for _ in 0..2 {
//!         let user = engine
//!             .cacheable(&read, &inv, || async { Ok::<_, std::io::Error>(Some("Ann".to_string())) })
//!             .await
//!             .unwrap();
//!         println!("{:?}", user);
//!     }
//!
//!     // Update: evict the entry, then announce the change
//!     let announce = Publish::new("user-updated").event("UPDATED");
//!     engine
//!         .evict(&Evict::key("user", "#id"), &inv, || {
//!             engine.publish(&announce, &inv, || async { Ok::<_, std::io::Error>(Some(42)) })
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`PolicyEngine`] facade
//! - [`cache`]: Read-through, eviction, and grouped hash policies
//! - [`pubsub`]: Publisher, subscriber registry and dispatcher
//! - [`policy`]: Descriptors and call arguments
//! - [`expr`]: Expression language for keys, conditions, payloads
//! - [`storage`]: Store backends (Redis, memory)
//! - [`resilience`]: Retry with exponential backoff

pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod expr;
pub mod keys;
pub mod metrics;
pub mod policy;
pub mod pubsub;
pub mod resilience;
pub mod storage;

pub use codec::{Codec, CodecError, JsonCodec, NULL_MARKER};
pub use config::{CacheConfig, CachewireConfig, ConfigError, PubSubConfig};
pub use engine::{EngineError, EngineState, PolicyEngine};
pub use expr::{EvalContext, Evaluator, ExprError};
pub use keys::KeyBuilder;
pub use metrics::LatencyTimer;
pub use policy::{Invocation, PolicyContext, PolicyDescriptor, PolicyKind};
pub use pubsub::{handler_fn, handler_fn0, BoxError, Envelope, MessageHandler, RegistrationError};
pub use resilience::retry::RetryConfig;
pub use storage::{InMemoryStore, KvStore, RedisStore, StorageError};
