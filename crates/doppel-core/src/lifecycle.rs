//! Lifecycle hooks: an ordered list of listeners notified at fixed
//! pipeline points (`before_request`, `after_response`, and the template
//! transformer chain's `before_transmitting_template`). Grounded on
//! `mockforge-core/src/lifecycle.rs`'s `LifecycleHookRegistry` shape, with
//! the hook set trimmed to the three points spec.md §4.6/§4.8 name and the
//! template-transform hook folded into the same registry rather than a
//! separate chain type.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::exchange::{MultiMap, RequestView, ResponseBuilder};

/// Immutable snapshot of the request passed to `before_request` hooks.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Request headers.
    pub headers: MultiMap,
    /// Query parameters.
    pub query: MultiMap,
}

impl RequestContext {
    /// Build a context view from a request.
    pub fn from_request(request: &RequestView) -> Self {
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
            query: request.query.clone(),
        }
    }
}

/// Immutable snapshot of the response passed to `after_response` hooks.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// Status code that was sent.
    pub status_code: u16,
    /// Elapsed time from resource resolution to flush, in milliseconds.
    pub response_time_ms: u64,
}

impl ResponseContext {
    /// Build a context view from a response and an elapsed duration.
    pub fn from_response(response: &ResponseBuilder, response_time_ms: u64) -> Self {
        Self { status_code: response.status.unwrap_or(0), response_time_ms }
    }
}

/// A pipeline extension point. Every method has a no-op default so a hook
/// only needs to implement what it cares about.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Fires after resource resolution, before the behaviour is built.
    async fn before_request(&self, _ctx: &RequestContext) {}

    /// Fires after the response has been flushed.
    async fn after_response(&self, _ctx: &ResponseContext) {}

    /// Transforms a templated response body before transmission. Must
    /// return the input unchanged if the hook has nothing to do — the
    /// signature has no `Option`/`null` path by construction, matching
    /// spec.md §4.6's "returning null is forbidden".
    async fn before_transmitting_template(&self, body: Vec<u8>) -> Vec<u8> {
        body
    }
}

/// Thread-safe, append-only (after startup) ordered list of hooks.
#[derive(Default)]
pub struct LifecycleHookRegistry {
    hooks: RwLock<Vec<Arc<dyn LifecycleHook>>>,
}

impl LifecycleHookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Hooks fire in registration order.
    pub async fn register_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.push(hook);
    }

    /// Invoke every hook's `before_request`, in registration order.
    pub async fn invoke_before_request(&self, ctx: &RequestContext) {
        for hook in self.hooks.read().await.iter() {
            hook.before_request(ctx).await;
        }
    }

    /// Invoke every hook's `after_response`, in registration order.
    pub async fn invoke_after_response(&self, ctx: &ResponseContext) {
        for hook in self.hooks.read().await.iter() {
            hook.after_response(ctx).await;
        }
    }

    /// Run the full template transformer chain over `body`, in
    /// registration order, per spec.md §4.6.
    pub async fn run_template_chain(&self, mut body: Vec<u8>) -> Vec<u8> {
        for hook in self.hooks.read().await.iter() {
            body = hook.before_transmitting_template(body).await;
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        before_count: AtomicUsize,
        after_count: AtomicUsize,
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        async fn before_request(&self, _ctx: &RequestContext) {
            self.before_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn after_response(&self, _ctx: &ResponseContext) {
            self.after_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn hooks_fire_in_registration_order_and_both_points() {
        let registry = LifecycleHookRegistry::new();
        let hook = Arc::new(CountingHook { before_count: AtomicUsize::new(0), after_count: AtomicUsize::new(0) });
        registry.register_hook(hook.clone()).await;

        let request_ctx = RequestContext { method: "GET".into(), path: "/ping".into(), headers: MultiMap::new(), query: MultiMap::new() };
        registry.invoke_before_request(&request_ctx).await;
        assert_eq!(hook.before_count.load(Ordering::SeqCst), 1);

        let response_ctx = ResponseContext { status_code: 200, response_time_ms: 5 };
        registry.invoke_after_response(&response_ctx).await;
        assert_eq!(hook.after_count.load(Ordering::SeqCst), 1);
    }

    struct UppercaseHook;

    #[async_trait]
    impl LifecycleHook for UppercaseHook {
        async fn before_transmitting_template(&self, body: Vec<u8>) -> Vec<u8> {
            String::from_utf8_lossy(&body).to_uppercase().into_bytes()
        }
    }

    #[tokio::test]
    async fn template_chain_applies_every_hook_in_order() {
        let registry = LifecycleHookRegistry::new();
        registry.register_hook(Arc::new(UppercaseHook)).await;

        let result = registry.run_template_chain(b"hello".to_vec()).await;
        assert_eq!(result, b"HELLO".to_vec());
    }

    #[tokio::test]
    async fn template_chain_is_identity_with_no_hooks() {
        let registry = LifecycleHookRegistry::new();
        let result = registry.run_template_chain(b"hello".to_vec()).await;
        assert_eq!(result, b"hello".to_vec());
    }
}
