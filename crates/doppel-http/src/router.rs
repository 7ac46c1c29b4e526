//! Concrete `axum::Router` wiring: converts inbound HTTP requests into
//! `AxumHttpExchange`s, dispatches them through the matcher and the
//! resolved plugin, and converts the resulting response builder back into
//! an `axum::response::Response`. Implements spec.md §4.7's literal/
//! parameterised/catch-all routing and 404 behaviour on top of
//! `doppel_core::matcher` rather than `axum`'s own path router, since the
//! core's specificity-scoring match has no `axum` equivalent.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use doppel_core::config::PluginConfig;
use doppel_core::error::Error;
use doppel_core::exchange::{HttpExchange, MultiMap};
use doppel_core::matcher::match_resource;
use doppel_core::plugin::PluginManager;
use doppel_core::router::{ErrorHandlerTable, NOT_FOUND_BODY};
use tokio_util::sync::CancellationToken;

use crate::exchange::{query_multimap, AxumHttpExchange};

/// One loaded plugin configuration paired with the plugin that serves it.
struct MountedConfig {
    config: Arc<PluginConfig>,
    plugin_name: String,
}

struct AppState {
    mounted: Vec<MountedConfig>,
    plugins: Arc<PluginManager>,
    error_handlers: ErrorHandlerTable,
}

/// Build the top-level `axum::Router` serving every loaded plugin
/// configuration. Per-status error handlers (spec.md §4.7) can be
/// registered by constructing an [`ErrorHandlerTable`] via
/// [`build_router_with_error_handlers`]; this entry point uses an empty
/// one, so every status falls back to [`doppel_core::router::default_error_handler`].
pub fn build_router(configs: Vec<PluginConfig>, plugins: Arc<PluginManager>) -> Router {
    build_router_with_error_handlers(configs, plugins, ErrorHandlerTable::new())
}

/// Like [`build_router`], but with an explicit [`ErrorHandlerTable`] for
/// per-status overrides.
pub fn build_router_with_error_handlers(configs: Vec<PluginConfig>, plugins: Arc<PluginManager>, error_handlers: ErrorHandlerTable) -> Router {
    let mounted = configs
        .into_iter()
        .map(|config| MountedConfig { plugin_name: config.plugin_name.clone(), config: Arc::new(config) })
        .collect();
    let state = Arc::new(AppState { mounted, plugins, error_handlers });

    Router::new().fallback(any(dispatch)).with_state(state)
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = query_multimap(uri.query().unwrap_or(""));
    let mut header_map = MultiMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str(), value);
        }
    }

    let cancellation = CancellationToken::new();
    let mut exchange = AxumHttpExchange::new(
        method.as_str().to_string(),
        uri.path().to_string(),
        query,
        header_map,
        body.to_vec(),
        cancellation,
    );

    for mounted in &state.mounted {
        let Some(found) = match_resource(exchange.request(), &mounted.config.resources) else {
            continue;
        };
        let resource = found.resource.clone();
        exchange.request_mut().path_params = found.path_params;

        let Some(plugin) = state.plugins.get(&mounted.plugin_name) else {
            tracing::error!(plugin = %mounted.plugin_name, "resource matched but plugin not registered");
            continue;
        };

        return match plugin.on_request(&mut exchange, &mounted.config, &resource).await {
            Ok(()) => response_from_exchange(exchange),
            Err(error) => {
                let status = error.status_code();
                let message = error.to_string();
                exchange.fail(error);
                let (status, body) = state.error_handlers.handle(status, &message);
                (StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), body).into_response()
            }
        };
    }

    exchange.fail(Error::NoMatch);
    let (status, body) = state.error_handlers.handle(Error::NoMatch.status_code(), NOT_FOUND_BODY);
    (StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND), [("content-type", "text/plain")], body).into_response()
}

fn response_from_exchange(exchange: AxumHttpExchange) -> Response {
    let builder = exchange.into_response_builder();
    let status = StatusCode::from_u16(builder.status.unwrap_or(200)).unwrap_or(StatusCode::OK);
    let mut response = Response::builder().status(status);
    for (name, value) in &builder.headers {
        response = response.header(name, value);
    }
    response.body(axum::body::Body::from(builder.body)).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
    })
}
