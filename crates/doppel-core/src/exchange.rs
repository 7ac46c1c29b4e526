//! The `HttpExchange` abstraction: a uniform per-request view over a
//! request/response pair, independent of the underlying server adapter.

use std::collections::HashMap;

use crate::error::Error;

/// Case-insensitive, multi-valued header/query container. Mirrors the
/// "multimap" surface spec.md §6 asks of the adapter.
#[derive(Debug, Clone, Default)]
pub struct MultiMap {
    entries: Vec<(String, String)>,
}

impl MultiMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one more value for `key`, preserving earlier values.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// The first value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in insertion order, compared
    /// case-insensitively.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether any entry has this key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate all (key, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Read-only view over the inbound request. Adapters populate this once per
/// request; the core never mutates it.
#[derive(Debug, Clone)]
pub struct RequestView {
    /// HTTP method, already uppercased.
    pub method: String,
    /// Request path, not including the query string.
    pub path: String,
    /// Query parameters.
    pub query: MultiMap,
    /// Request headers.
    pub headers: MultiMap,
    /// Raw request body bytes.
    pub body: Vec<u8>,
    /// Path parameters bound by the resource matcher. Populated by the
    /// router after matching; empty on the exchange as first constructed.
    pub path_params: HashMap<String, String>,
}

impl RequestView {
    /// The body decoded as UTF-8, lossily. Most callers (body matchers,
    /// capture sources, the script DSL) only ever need string access.
    pub fn body_as_string(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// How the response body will be produced.
#[derive(Debug, Clone)]
pub enum BodySource {
    /// Stream or render the named file, relative to the plugin directory.
    File(String),
    /// Use this literal string as the body.
    Inline(String),
    /// No body; try fallback senders, else send nothing.
    Empty,
}

/// Mutable response half of an exchange, populated by the response service
/// before transmission.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    /// HTTP status code to send. `None` until the response service sets it.
    pub status: Option<u16>,
    /// Headers to send, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Bytes already written to the body, if the adapter buffers rather
    /// than streams.
    pub body: Vec<u8>,
    /// Whether `end()` has been called; no further writes are permitted
    /// once set.
    pub ended: bool,
}

impl ResponseBuilder {
    /// Set the status code.
    pub fn set_status_code(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Append a response header. Does not deduplicate; later calls with the
    /// same name add another header line, matching typical HTTP semantics.
    pub fn put_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Write body bytes and mark the response ended.
    pub fn end(&mut self, body: Option<Vec<u8>>) {
        if let Some(bytes) = body {
            self.body = bytes;
        }
        self.ended = true;
    }
}

/// Per-request object threading request, response, attributes, and failure
/// state through the pipeline. Implemented concretely by the HTTP adapter
/// (`doppel-http::AxumHttpExchange`); the core depends only on this trait.
pub trait HttpExchange: Send {
    /// The immutable request view.
    fn request(&self) -> &RequestView;

    /// Mutable access to path parameters bound by the router. Exposed
    /// separately from `request()` because the router populates them after
    /// the exchange is constructed but the request body stays immutable.
    fn request_mut(&mut self) -> &mut RequestView;

    /// Mutable access to the response builder.
    fn response_mut(&mut self) -> &mut ResponseBuilder;

    /// Read-only access to the response builder.
    fn response(&self) -> &ResponseBuilder;

    /// Attribute bag used to pass route-matched context (e.g. the resolved
    /// resource id) forward through the pipeline.
    fn attributes_mut(&mut self) -> &mut HashMap<String, String>;

    /// Read an attribute set earlier in the pipeline.
    fn attribute(&self, key: &str) -> Option<&str>;

    /// Record a failure. The router consults this to select an error
    /// handler; once set, the pipeline stops processing the exchange.
    fn fail(&mut self, error: Error);

    /// The failure recorded via `fail`, if any.
    fn failure(&self) -> Option<&Error>;

    /// Whether the underlying connection has been closed by the client.
    /// Suspension points (performance-simulation timer, file reads) should
    /// check this and abandon work rather than transmit to a dead
    /// connection.
    fn is_cancelled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimap_lookup_is_case_insensitive() {
        let mut map = MultiMap::new();
        map.insert("Content-Type", "application/json");
        assert_eq!(map.get("content-type"), Some("application/json"));
        assert!(map.contains_key("CONTENT-TYPE"));
    }

    #[test]
    fn multimap_preserves_multiple_values() {
        let mut map = MultiMap::new();
        map.insert("x-tag", "a");
        map.insert("x-tag", "b");
        assert_eq!(map.get_all("x-tag"), vec!["a", "b"]);
        assert_eq!(map.get("x-tag"), Some("a"));
    }

    #[test]
    fn response_builder_end_marks_ended() {
        let mut builder = ResponseBuilder::default();
        builder.set_status_code(200);
        builder.end(Some(b"pong".to_vec()));
        assert!(builder.ended);
        assert_eq!(builder.body, b"pong");
    }
}
