//! Response service: the end-to-end orchestrator (§4.5). Performance
//! simulation → header emission → body rendering → flush, then
//! `response_sent` captures. Owns the shared [`ResponseFileCache`].

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::behaviour::{ResponseBehaviour, ResponseMode};
use crate::cache::{resolve_response_file, ResponseFileCache};
use crate::capture::run_captures;
use crate::config::{CaptureConfig, CapturePhase};
use crate::error::{Error, Result};
use crate::exchange::{BodySource, HttpExchange};
use crate::latency::simulate_performance;
use crate::lifecycle::{LifecycleHookRegistry, ResponseContext};
use crate::metrics;
use crate::store::StoreFactory;

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// A last-resort body producer, tried in order when a behaviour's body is
/// [`BodySource::Empty`]. Returns `Some(body)` if it produced content.
pub trait FallbackSender: Send + Sync {
    /// Attempt to produce a body for this request.
    fn try_send(&self) -> Option<Vec<u8>>;
}

/// Collaborators the response service needs for one request.
pub struct ResponseServiceContext<'a> {
    /// Directory response files are resolved relative to.
    pub plugin_dir: &'a Path,
    /// Explicit content type from the plugin config, if any.
    pub default_content_type: Option<&'a str>,
    /// Shared response-file cache.
    pub file_cache: &'a ResponseFileCache,
    /// Lifecycle hook registry (also runs the template transformer
    /// chain).
    pub lifecycle: &'a LifecycleHookRegistry,
    /// Fallback senders, tried in order for an empty behaviour.
    pub fallback_senders: &'a [Arc<dyn FallbackSender>],
    /// Store factory, for `response_sent`-phase captures.
    pub store_factory: &'a dyn StoreFactory,
    /// Captures declared on the resolved resource.
    pub captures: &'a [CaptureConfig],
}

/// Run the full render+transmit pipeline for a built `behaviour` against
/// `exchange`.
pub async fn respond(
    exchange: &mut dyn HttpExchange,
    behaviour: &ResponseBehaviour,
    cancellation: &CancellationToken,
    ctx: &ResponseServiceContext<'_>,
) -> Result<()> {
    let started = std::time::Instant::now();

    simulate_performance(behaviour.performance.as_ref(), cancellation).await;
    if exchange.is_cancelled() {
        return Ok(());
    }

    emit_headers(exchange, behaviour, ctx);

    match behaviour.mode {
        ResponseMode::ShortCircuit => {
            exchange.response_mut().end(None);
        }
        ResponseMode::Default => {
            let body = render_body(behaviour, ctx).await?;
            exchange.response_mut().end(body);
        }
    }

    if exchange.is_cancelled() {
        tracing::debug!("client disconnected before flush completed, skipping response_sent captures");
        return Ok(());
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let response_ctx = ResponseContext::from_response(exchange.response(), elapsed_ms);
    ctx.lifecycle.invoke_after_response(&response_ctx).await;

    run_captures(ctx.captures, CapturePhase::ResponseSent, exchange.request(), ctx.store_factory).await;

    metrics::record_cache_entries(ctx.file_cache.len().await);

    Ok(())
}

fn emit_headers(exchange: &mut dyn HttpExchange, behaviour: &ResponseBehaviour, ctx: &ResponseServiceContext<'_>) {
    let response = exchange.response_mut();
    response.set_status_code(behaviour.status);
    for (name, value) in &behaviour.headers {
        response.put_header(name.clone(), value.clone());
    }

    let has_content_type = behaviour.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
        let content_type = infer_content_type(behaviour, ctx);
        exchange.response_mut().put_header("Content-Type", content_type);
    }
}

fn infer_content_type(behaviour: &ResponseBehaviour, ctx: &ResponseServiceContext<'_>) -> String {
    if let Some(default_content_type) = ctx.default_content_type {
        return default_content_type.to_string();
    }
    if let BodySource::File(path) = &behaviour.body {
        if let Some(mime) = mime_guess::from_path(path).first() {
            return mime.essence_str().to_string();
        }
    }
    tracing::trace!(default = DEFAULT_CONTENT_TYPE, "guessing content type, falling back to default");
    DEFAULT_CONTENT_TYPE.to_string()
}

async fn render_body(behaviour: &ResponseBehaviour, ctx: &ResponseServiceContext<'_>) -> Result<Option<Vec<u8>>> {
    match &behaviour.body {
        BodySource::File(relative) => {
            let path = resolve_response_file(ctx.plugin_dir, relative)?;
            if behaviour.is_template {
                let content = ctx.file_cache.get_or_read(&path).await?;
                let transformed = ctx.lifecycle.run_template_chain(content.as_bytes().to_vec()).await;
                Ok(Some(transformed))
            } else {
                let content = tokio::fs::read(&path).await.map_err(Error::from)?;
                Ok(Some(content))
            }
        }
        BodySource::Inline(data) => {
            if behaviour.is_template {
                let transformed = ctx.lifecycle.run_template_chain(data.clone().into_bytes()).await;
                Ok(Some(transformed))
            } else {
                Ok(Some(data.clone().into_bytes()))
            }
        }
        BodySource::Empty => {
            for sender in ctx.fallback_senders {
                if let Some(body) = sender.try_send() {
                    return Ok(Some(body));
                }
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceConfig;
    use crate::exchange::{MultiMap, RequestView, ResponseBuilder};
    use crate::store::InMemoryStoreFactory;
    use std::collections::HashMap;

    struct TestExchange {
        request: RequestView,
        response: ResponseBuilder,
        attributes: HashMap<String, String>,
        failure: Option<Error>,
        cancelled: bool,
    }

    impl HttpExchange for TestExchange {
        fn request(&self) -> &RequestView {
            &self.request
        }
        fn request_mut(&mut self) -> &mut RequestView {
            &mut self.request
        }
        fn response_mut(&mut self) -> &mut ResponseBuilder {
            &mut self.response
        }
        fn response(&self) -> &ResponseBuilder {
            &self.response
        }
        fn attributes_mut(&mut self) -> &mut HashMap<String, String> {
            &mut self.attributes
        }
        fn attribute(&self, key: &str) -> Option<&str> {
            self.attributes.get(key).map(String::as_str)
        }
        fn fail(&mut self, error: Error) {
            self.failure = Some(error);
        }
        fn failure(&self) -> Option<&Error> {
            self.failure.as_ref()
        }
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }
    }

    fn exchange() -> TestExchange {
        TestExchange {
            request: RequestView {
                method: "GET".to_string(),
                path: "/ping".to_string(),
                query: MultiMap::new(),
                headers: MultiMap::new(),
                body: Vec::new(),
                path_params: HashMap::new(),
            },
            response: ResponseBuilder::default(),
            attributes: HashMap::new(),
            failure: None,
            cancelled: false,
        }
    }

    fn behaviour(body: BodySource) -> ResponseBehaviour {
        ResponseBehaviour {
            status: 200,
            headers: Vec::new(),
            body,
            is_template: false,
            performance: None,
            mode: ResponseMode::Default,
            example_name: None,
        }
    }

    #[tokio::test]
    async fn inline_body_defaults_content_type_to_json() {
        let mut exchange = exchange();
        let file_cache = ResponseFileCache::new(4);
        let lifecycle = LifecycleHookRegistry::new();
        let factory = InMemoryStoreFactory::new();
        let cancellation = CancellationToken::new();

        let ctx = ResponseServiceContext {
            plugin_dir: Path::new("/tmp"),
            default_content_type: None,
            file_cache: &file_cache,
            lifecycle: &lifecycle,
            fallback_senders: &[],
            store_factory: &factory,
            captures: &[],
        };

        let b = behaviour(BodySource::Inline("pong".to_string()));
        respond(&mut exchange, &b, &cancellation, &ctx).await.unwrap();

        assert_eq!(exchange.response.status, Some(200));
        assert_eq!(exchange.response.body, b"pong");
        assert!(exchange.response.headers.contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[tokio::test]
    async fn short_circuit_mode_sends_empty_body() {
        let mut exchange = exchange();
        let file_cache = ResponseFileCache::new(4);
        let lifecycle = LifecycleHookRegistry::new();
        let factory = InMemoryStoreFactory::new();
        let cancellation = CancellationToken::new();

        let ctx = ResponseServiceContext {
            plugin_dir: Path::new("/tmp"),
            default_content_type: None,
            file_cache: &file_cache,
            lifecycle: &lifecycle,
            fallback_senders: &[],
            store_factory: &factory,
            captures: &[],
        };

        let mut b = behaviour(BodySource::File("unused.json".to_string()));
        b.mode = ResponseMode::ShortCircuit;
        b.status = 418;
        respond(&mut exchange, &b, &cancellation, &ctx).await.unwrap();

        assert_eq!(exchange.response.status, Some(418));
        assert!(exchange.response.body.is_empty());
    }

    #[test]
    fn exact_delay_config_is_not_a_range() {
        let config = PerformanceConfig { exact_delay_ms: Some(10), min_delay_ms: None, max_delay_ms: None };
        assert_eq!(config.exact_delay_ms, Some(10));
    }
}
