// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Subscriber handlers.
//!
//! A handler takes zero or one parameter. The one-parameter form receives
//! the envelope payload converted to its own type; conversion happens on
//! every attempt, so a payload that does not fit counts as a handler
//! failure and is retried like one.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::envelope::Envelope;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Used in logs.
    fn name(&self) -> &str;

    /// Declared parameter count. Registration rejects anything above 1.
    fn arity(&self) -> usize;

    async fn handle(&self, envelope: &Envelope) -> Result<(), BoxError>;
}

struct PayloadHandler<T, F> {
    name: String,
    f: F,
    _payload: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, F, Fut> MessageHandler for PayloadHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        1
    }

    async fn handle(&self, envelope: &Envelope) -> Result<(), BoxError> {
        let payload: T = envelope.payload_as()?;
        (self.f)(payload).await
    }
}

struct NullaryHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for NullaryHandler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        0
    }

    async fn handle(&self, _envelope: &Envelope) -> Result<(), BoxError> {
        (self.f)().await
    }
}

/// Handler taking the payload as `T`.
///
/// ```rust
/// use cachewire::pubsub::{handler_fn, BoxError, MessageHandler};
///
/// let h = handler_fn("on_user", |id: u64| async move {
///     println!("user {} changed", id);
///     Ok::<(), BoxError>(())
/// });
/// assert_eq!(h.arity(), 1);
/// ```
pub fn handler_fn<T, F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn MessageHandler>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(PayloadHandler {
        name: name.into(),
        f,
        _payload: PhantomData,
    })
}

/// Handler that ignores the payload.
pub fn handler_fn0<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn MessageHandler>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(NullaryHandler { name: name.into(), f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_payload_handler_receives_typed_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let h = handler_fn("sum", move |n: usize| {
            let seen = seen_clone.clone();
            async move {
                seen.fetch_add(n, Ordering::SeqCst);
                Ok(())
            }
        });

        h.handle(&Envelope::new("E", "s", json!(5))).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_conversion_failure_is_handler_error() {
        let h = handler_fn("typed", |_n: u32| async { Ok(()) });
        assert!(h.handle(&Envelope::new("E", "s", json!("nope"))).await.is_err());
    }

    #[tokio::test]
    async fn test_nullary_handler() {
        let h = handler_fn0("ping", || async { Err::<(), BoxError>("down".into()) });
        assert_eq!(h.arity(), 0);
        assert_eq!(h.name(), "ping");
        assert!(h.handle(&Envelope::new("E", "s", json!(null))).await.is_err());
    }
}
