//! `axum`/`hyper` implementation of [`doppel_core::exchange::HttpExchange`].

use std::collections::HashMap;

use doppel_core::error::Error;
use doppel_core::exchange::{HttpExchange, MultiMap, RequestView, ResponseBuilder};
use tokio_util::sync::CancellationToken;

/// Concrete per-request exchange backed by an in-memory request view and
/// response builder. The router constructs one per incoming request and
/// converts the final [`ResponseBuilder`] into an `axum::response::Response`
/// once the pipeline completes.
pub struct AxumHttpExchange {
    request: RequestView,
    response: ResponseBuilder,
    attributes: HashMap<String, String>,
    failure: Option<Error>,
    cancellation: CancellationToken,
}

impl AxumHttpExchange {
    /// Build an exchange from already-extracted request parts.
    pub fn new(
        method: String,
        path: String,
        query: MultiMap,
        headers: MultiMap,
        body: Vec<u8>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request: RequestView { method, path, query, headers, body, path_params: HashMap::new() },
            response: ResponseBuilder::default(),
            attributes: HashMap::new(),
            failure: None,
            cancellation,
        }
    }

    /// Consume the exchange, returning its final response state.
    pub fn into_response_builder(self) -> ResponseBuilder {
        self.response
    }
}

impl HttpExchange for AxumHttpExchange {
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
        self.cancellation.is_cancelled()
    }
}

/// Convert parsed `axum` request parts into the query/header multimaps
/// [`HttpExchange`] expects.
pub fn query_multimap(query: &str) -> MultiMap {
    let mut map = MultiMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value).map(|s| s.into_owned()).unwrap_or_else(|_| value.to_string());
        map.insert(key, value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_multimap_decodes_and_preserves_repeats() {
        let map = query_multimap("q=rust%20lang&tag=a&tag=b");
        assert_eq!(map.get("q"), Some("rust lang"));
        assert_eq!(map.get_all("tag"), vec!["a", "b"]);
    }

    #[test]
    fn exchange_reports_cancellation() {
        let cancellation = CancellationToken::new();
        let exchange = AxumHttpExchange::new(
            "GET".to_string(),
            "/ping".to_string(),
            MultiMap::new(),
            MultiMap::new(),
            Vec::new(),
            cancellation.clone(),
        );
        assert!(!exchange.is_cancelled());
        cancellation.cancel();
        assert!(exchange.is_cancelled());
    }
}
