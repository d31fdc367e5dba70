//! Policy descriptors, call arguments, and the shared state every policy
//! runs against.

pub mod descriptor;
pub mod invocation;

use std::sync::Arc;

use tracing::warn;

use crate::codec::Codec;
use crate::config::CachewireConfig;
use crate::expr::{EvalContext, Evaluator};
use crate::keys::KeyBuilder;
use crate::storage::KvStore;

pub use descriptor::{
    Cacheable, Evict, HashEvict, HashGet, HashPut, PolicyDescriptor, PolicyKind, Publish, Subscribe,
};
pub use invocation::Invocation;

/// Store, codec, evaluator and configuration shared by all policies.
/// Cheap to clone.
#[derive(Clone)]
pub struct PolicyContext {
    pub store: Arc<dyn KvStore>,
    pub codec: Arc<dyn Codec>,
    pub evaluator: Arc<Evaluator>,
    pub keys: KeyBuilder,
    pub config: Arc<CachewireConfig>,
}

impl PolicyContext {
    pub fn new(config: CachewireConfig, store: Arc<dyn KvStore>, codec: Arc<dyn Codec>) -> Self {
        Self {
            store,
            codec,
            evaluator: Arc::new(Evaluator::new()),
            keys: KeyBuilder::new(config.cache.prefix.clone()),
            config: Arc::new(config),
        }
    }

    /// Evaluate a boolean guard. Blank expressions and evaluation errors
    /// both resolve to `fallback`.
    pub(crate) fn guard(&self, policy: PolicyKind, what: &str, expr: &str, ctx: &EvalContext, fallback: bool) -> bool {
        match self.evaluator.eval_bool(expr, ctx, fallback) {
            Ok(v) => v,
            Err(e) => {
                warn!(%policy, expr, error = %e, "{} evaluation failed, using {}", what, fallback);
                fallback
            }
        }
    }
}
