//! Thin binary entry point. CLI ergonomics are explicitly out of scope for
//! the specification; this exists only so the workspace produces a
//! runnable artifact that loads one or more configuration directories and
//! starts the HTTP adapter.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use doppel_core::cache::ResponseFileCache;
use doppel_core::config::FeatureFlags;
use doppel_core::lifecycle::LifecycleHookRegistry;
use doppel_core::plugin::PluginManager;
use doppel_core::store::{InMemoryStoreFactory, StoreFactory};
use doppel_http::rest_plugin::RestPlugin;

/// A configuration-driven HTTP mock server.
#[derive(Debug, Parser)]
#[command(name = "doppel", version, about)]
struct Cli {
    /// Directories containing plugin configuration documents.
    #[arg(required = true)]
    config_dirs: Vec<PathBuf>,

    /// Port to listen on.
    #[arg(long, env = "DOPPEL_PORT", default_value_t = 8080)]
    port: u16,

    /// Log level (passed to `tracing-subscriber`'s `EnvFilter`).
    #[arg(long, env = "DOPPEL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log_level))
        .init();

    let configs = doppel_http::config_loader::load_plugin_configs(&cli.config_dirs)?;
    tracing::info!(count = configs.len(), "loaded plugin configurations");

    let store_factory: Arc<dyn StoreFactory> = Arc::new(InMemoryStoreFactory::new());
    let lifecycle = Arc::new(LifecycleHookRegistry::new());
    let file_cache = Arc::new(ResponseFileCache::from_env());
    let feature_flags = FeatureFlags::from_env();

    #[cfg(feature = "scripting")]
    let script_service = Some(Arc::new(doppel_core::script::QuickJsScriptService::new(true)?) as Arc<dyn doppel_core::script::ScriptService>);

    let rest_plugin = Arc::new(RestPlugin::new(
        Arc::clone(&store_factory),
        Arc::clone(&lifecycle),
        Arc::clone(&file_cache),
        feature_flags,
        #[cfg(feature = "scripting")]
        script_service,
    ));

    let mut plugins = PluginManager::new();
    plugins.register(rest_plugin);
    let plugins = Arc::new(plugins);

    let router = doppel_http::router::build_router(configs, plugins);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    tracing::info!(port = cli.port, "doppel listening");
    axum::serve(listener, router).await?;

    Ok(())
}
