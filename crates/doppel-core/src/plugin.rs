//! Plugin surface: the interface each concrete plugin implements
//! (`routes`, `on_request`), plus an explicit registration table replacing
//! classpath scanning, per Design Notes §9. `doppel-http::RestPlugin` is
//! the one concrete, fully specified plugin; OpenAPI-driven or other
//! plugins are out of scope but would implement the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{HttpMethod, PluginConfig, ResourceConfig};
use crate::error::Result;
use crate::exchange::HttpExchange;

/// One route a plugin wants registered with the router.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Method to match, or `None` for any.
    pub method: Option<HttpMethod>,
    /// Path template, as configured.
    pub path: String,
    /// Resource id this route resolves to.
    pub resource_id: String,
}

/// A pluggable strategy supplying routes and per-request behaviour for one
/// family of endpoints (plain REST, OpenAPI-driven, ...).
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short, registered name this plugin is addressed by in
    /// configuration (e.g. `"rest"`).
    fn name(&self) -> &str;

    /// Describe every route this plugin's configuration contributes.
    fn routes(&self, config: &PluginConfig) -> Vec<RouteDescriptor>;

    /// Handle a matched request: build and apply the response behaviour
    /// for `resource` against `exchange`.
    async fn on_request(&self, exchange: &mut dyn HttpExchange, config: &PluginConfig, resource: &ResourceConfig) -> Result<()>;
}

/// Registry of plugins, populated once at startup and read-only
/// thereafter — the "explicit registration table" Design Notes §9 calls
/// for, in place of classpath scanning.
#[derive(Default)]
pub struct PluginManager {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own [`Plugin::name`].
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Look up a plugin by its registered name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Every registered plugin name, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct NoopPlugin;

    #[async_trait]
    impl Plugin for NoopPlugin {
        fn name(&self) -> &str {
            "noop"
        }

        fn routes(&self, _config: &PluginConfig) -> Vec<RouteDescriptor> {
            Vec::new()
        }

        async fn on_request(&self, _exchange: &mut dyn HttpExchange, _config: &PluginConfig, _resource: &ResourceConfig) -> Result<()> {
            Err(Error::Generic("unused in this test".to_string()))
        }
    }

    #[test]
    fn register_and_lookup_by_name() {
        let mut manager = PluginManager::new();
        manager.register(Arc::new(NoopPlugin));
        assert!(manager.get("noop").is_some());
        assert!(manager.get("missing").is_none());
        assert_eq!(manager.names(), vec!["noop"]);
    }
}
