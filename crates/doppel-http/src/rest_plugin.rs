//! `RestPlugin`: the plain REST plugin spec.md §1 calls "the one in-scope,
//! fully specified" plugin specialisation. Implements
//! `doppel_core::plugin::Plugin` end-to-end over the core pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use doppel_core::behaviour::{behaviour_from_resource, ResponseBehaviour};
use doppel_core::cache::ResponseFileCache;
use doppel_core::capture::run_captures;
use doppel_core::config::{CapturePhase, FeatureFlags, PluginConfig, ResourceConfig};
use doppel_core::error::Result;
use doppel_core::exchange::HttpExchange;
use doppel_core::lifecycle::{LifecycleHookRegistry, RequestContext};
use doppel_core::plugin::{Plugin, RouteDescriptor};
use doppel_core::response_service::{respond, FallbackSender, ResponseServiceContext};
use doppel_core::store::StoreFactory;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "scripting")]
use doppel_core::script::{ScriptExecutionContext, ScriptService};

/// Collaborators shared by every request the plugin handles.
pub struct RestPlugin {
    store_factory: Arc<dyn StoreFactory>,
    lifecycle: Arc<LifecycleHookRegistry>,
    file_cache: Arc<ResponseFileCache>,
    fallback_senders: Vec<Arc<dyn FallbackSender>>,
    #[cfg(feature = "scripting")]
    script_service: Option<Arc<dyn ScriptService>>,
    feature_flags: FeatureFlags,
    env: HashMap<String, String>,
}

impl RestPlugin {
    /// Construct the plugin with its collaborators. `feature_flags` gates
    /// optional DSL surface (the `stores` script global) per spec.md §4.4.
    pub fn new(
        store_factory: Arc<dyn StoreFactory>,
        lifecycle: Arc<LifecycleHookRegistry>,
        file_cache: Arc<ResponseFileCache>,
        feature_flags: FeatureFlags,
        #[cfg(feature = "scripting")] script_service: Option<Arc<dyn ScriptService>>,
    ) -> Self {
        Self {
            store_factory,
            lifecycle,
            file_cache,
            fallback_senders: Vec::new(),
            #[cfg(feature = "scripting")]
            script_service,
            feature_flags,
            env: std::env::vars().collect(),
        }
    }

    /// Register a fallback sender, tried in order for an empty behaviour.
    pub fn with_fallback_sender(mut self, sender: Arc<dyn FallbackSender>) -> Self {
        self.fallback_senders.push(sender);
        self
    }

    async fn build_behaviour(&self, config: &PluginConfig, resource: &ResourceConfig, exchange: &dyn HttpExchange) -> Result<ResponseBehaviour> {
        #[cfg(feature = "scripting")]
        if let (Some(script_file), Some(script_service)) = (&resource.response.script_file, &self.script_service) {
            let script_path = config.parent_dir.join(script_file);
            let context = ScriptExecutionContext::from_request(
                exchange.request(),
                self.env.clone(),
                resource.response.clone(),
                if config.defaults_from_root_response { config.root_response.clone() } else { None },
            );
            let stores = self.feature_flags.stores.then(|| Arc::clone(&self.store_factory));
            return script_service.execute(&script_path, context, stores).await;
        }

        let _ = exchange;
        Ok(behaviour_from_resource(resource, config.root_response.as_ref(), config.defaults_from_root_response))
    }
}

#[async_trait]
impl Plugin for RestPlugin {
    fn name(&self) -> &str {
        "rest"
    }

    fn routes(&self, config: &PluginConfig) -> Vec<RouteDescriptor> {
        config
            .resources
            .iter()
            .enumerate()
            .filter(|(_, resource)| resource.enabled)
            .map(|(index, resource)| RouteDescriptor {
                method: resource.method,
                path: resource.path.0.raw().to_string(),
                resource_id: resource.id.clone().unwrap_or_else(|| index.to_string()),
            })
            .collect()
    }

    async fn on_request(&self, exchange: &mut dyn HttpExchange, config: &PluginConfig, resource: &ResourceConfig) -> Result<()> {
        self.lifecycle.invoke_before_request(&RequestContext::from_request(exchange.request())).await;

        run_captures(&resource.captures, CapturePhase::RequestReceived, exchange.request(), self.store_factory.as_ref()).await;

        let behaviour = self.build_behaviour(config, resource, exchange).await?;

        let response_ctx = ResponseServiceContext {
            plugin_dir: &config.parent_dir,
            default_content_type: config.default_content_type.as_deref(),
            file_cache: &self.file_cache,
            lifecycle: &self.lifecycle,
            fallback_senders: &self.fallback_senders,
            store_factory: self.store_factory.as_ref(),
            captures: &resource.captures,
        };

        let cancellation = CancellationToken::new();
        respond(exchange, &behaviour, &cancellation, &response_ctx).await
    }
}
