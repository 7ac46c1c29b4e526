//! Router/dispatch abstraction: maps `(method, path-pattern) → resource
//! id` and holds the per-status error-handler table. The concrete
//! `axum::Router` wiring lives in `doppel-http::router`; this module only
//! defines the trait-level contract spec.md §4.7 describes, grounded on
//! the route-registry shape of `mockforge-core/src/routing.rs` but
//! returning a resource id rather than dispatching directly (dispatch
//! itself is the HTTP adapter's job).

use std::collections::HashMap;

use crate::config::{HttpMethod, PathTemplate};

/// Body returned for an unmatched request, per spec.md §6.
pub const NOT_FOUND_BODY: &str = "Resource not found";

/// One registered route: a method (or "any") plus a compiled path
/// template, resolving to a resource id a plugin can look up in its own
/// `ResourceConfig` list.
struct RegisteredRoute {
    method: Option<HttpMethod>,
    template: PathTemplate,
    resource_id: String,
}

/// `(method, path-pattern) → resource id` table. Built once per plugin at
/// startup from its `ResourceConfig` list and never mutated afterward.
pub trait RouteTable: Send + Sync {
    /// Resolve `method`/`path` to the id of the resource that would serve
    /// it, without running the full specificity-scoring matcher (used by
    /// diagnostics and the router's own route-existence checks; the
    /// response pipeline always goes through `matcher::match_resource`
    /// for the scoring behaviour).
    fn resolve(&self, method: &str, path: &str) -> Option<&str>;
}

/// Default in-memory [`RouteTable`].
#[derive(Default)]
pub struct InMemoryRouteTable {
    routes: Vec<RegisteredRoute>,
}

impl InMemoryRouteTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one route. Declaration order matters only for tie-breaks
    /// in the separate specificity matcher; this table returns the first
    /// structural match.
    pub fn register(&mut self, method: Option<HttpMethod>, path_pattern: &str, resource_id: impl Into<String>) {
        self.routes.push(RegisteredRoute {
            method,
            template: PathTemplate::compile(path_pattern),
            resource_id: resource_id.into(),
        });
    }
}

impl RouteTable for InMemoryRouteTable {
    fn resolve(&self, method: &str, path: &str) -> Option<&str> {
        let request_method = HttpMethod::parse(method);
        self.routes
            .iter()
            .find(|route| {
                let method_ok = match route.method {
                    None => true,
                    Some(configured) => request_method == Some(configured),
                };
                method_ok && route.template.matches(path).is_some()
            })
            .map(|route| route.resource_id.as_str())
    }
}

/// A handler invoked when a request fails with a given status code.
/// Returns the status code and body to actually send (handlers may
/// override the status, e.g. to mask an internal code).
pub type ErrorHandlerFn = dyn Fn(u16, &str) -> (u16, String) + Send + Sync;

/// Per-status error handlers, registered separately from routes. Absent
/// any match, the router falls back to [`default_error_handler`].
#[derive(Default)]
pub struct ErrorHandlerTable {
    handlers: HashMap<u16, Box<ErrorHandlerFn>>,
}

impl ErrorHandlerTable {
    /// An empty table; every status falls back to the default handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `status`.
    pub fn register(&mut self, status: u16, handler: Box<ErrorHandlerFn>) {
        self.handlers.insert(status, handler);
    }

    /// Resolve the handler for `status`, or the default.
    pub fn handle(&self, status: u16, message: &str) -> (u16, String) {
        match self.handlers.get(&status) {
            Some(handler) => handler(status, message),
            None => default_error_handler(status, message),
        }
    }
}

/// Emit the status with a textual description and log at the severity
/// spec.md §7 specifies: ERROR for 5xx, WARN for 4xx.
pub fn default_error_handler(status: u16, message: &str) -> (u16, String) {
    if status >= 500 {
        tracing::error!(status, message, "request failed");
    } else if status >= 400 {
        tracing::warn!(status, message, "request failed");
    }
    (status, message.to_string())
}
