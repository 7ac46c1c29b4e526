//! Scripted response service: compiles and executes a user script through
//! an embedded JS engine, exposing the response-builder DSL and a handful
//! of read-only bindings as host-injected globals. Grounded on the
//! `rquickjs` host-global-injection technique in
//! `mockforge-core/src/request_scripting.rs`, with a narrower DSL surface
//! matching this pipeline's `ResponseBehaviourBuilder` instead of that
//! crate's chain/variables bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use rquickjs::{Context, Ctx, Exception, Function, Object, Runtime, Value as JsValue};

use crate::behaviour::{ResponseBehaviour, ResponseBehaviourBuilder};
use crate::config::ResponseConfig;
use crate::error::{Error, Result};
use crate::exchange::RequestView;
use crate::metrics;
use crate::store::{Store, StoreFactory};

const LOGGER_CACHE_CAPACITY: usize = 20;
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a script needs read-only access to: the request, resolved
/// path parameters, environment, and the script's own file path (used for
/// its logger name and in error messages).
#[derive(Debug, Clone)]
pub struct ScriptExecutionContext {
    /// Request method, path, headers, query, decoded body.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Decoded request body.
    pub body: String,
    /// Query parameters as a flat map (first value per name).
    pub query: HashMap<String, String>,
    /// Request headers as a flat map (first value per name).
    pub headers: HashMap<String, String>,
    /// Path parameters bound by the matcher.
    pub path_params: HashMap<String, String>,
    /// Process environment snapshot exposed to the script as `env`.
    pub env: HashMap<String, String>,
    /// The resource's static response, overlaid onto the script's result
    /// when it calls `usingDefaultBehaviour()`.
    pub defaults: ResponseConfig,
    /// The plugin's root response, overlaid when
    /// `defaults_from_root_response` is set — applied regardless of what
    /// the script decided.
    pub root_defaults: Option<ResponseConfig>,
}

impl ScriptExecutionContext {
    /// Build a context from a resolved request and the resource/plugin
    /// defaults the builder falls back to.
    pub fn from_request(
        request: &RequestView,
        env: HashMap<String, String>,
        defaults: ResponseConfig,
        root_defaults: Option<ResponseConfig>,
    ) -> Self {
        let mut query = HashMap::new();
        for (key, value) in request.query.iter() {
            query.entry(key.to_string()).or_insert_with(|| value.to_string());
        }
        let mut headers = HashMap::new();
        for (key, value) in request.headers.iter() {
            headers.entry(key.to_string()).or_insert_with(|| value.to_string());
        }
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body_as_string().into_owned(),
            query,
            headers,
            path_params: request.path_params.clone(),
            env,
            defaults,
            root_defaults,
        }
    }
}

/// Compiles and executes the user script at a resource's configured
/// `script_file`, returning a [`ResponseBehaviour`].
#[async_trait]
pub trait ScriptService: Send + Sync {
    /// Execute the script at `script_path` against `context`, optionally
    /// with store access (when the `stores` feature flag is enabled).
    async fn execute(
        &self,
        script_path: &Path,
        context: ScriptExecutionContext,
        stores: Option<Arc<dyn StoreFactory>>,
    ) -> Result<ResponseBehaviour>;
}

struct CachedScript {
    source: String,
    mtime: SystemTime,
}

/// `rquickjs`-backed [`ScriptService`]. One instance is shared across all
/// requests; `Runtime` is `Send + Sync` but a `Context` is created fresh
/// per execution so scripts never share a global object across requests.
pub struct QuickJsScriptService {
    runtime: Runtime,
    compiled: Mutex<HashMap<PathBuf, CachedScript>>,
    loggers: Mutex<LruCache<String, ()>>,
    revalidate_mtime: bool,
}

impl QuickJsScriptService {
    /// Construct a script service. `revalidate_mtime` corresponds to the
    /// spec's "optional — may be disabled via a config flag" cache
    /// invalidation behaviour.
    pub fn new(revalidate_mtime: bool) -> Result<Self> {
        let runtime = Runtime::new().map_err(Error::from)?;
        Ok(Self {
            runtime,
            compiled: Mutex::new(HashMap::new()),
            loggers: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(LOGGER_CACHE_CAPACITY).expect("nonzero capacity"),
            )),
            revalidate_mtime,
        })
    }

    fn load_source(&self, script_path: &Path) -> Result<String> {
        let metadata = std::fs::metadata(script_path)?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let mut compiled = self.compiled.lock();
        if let Some(cached) = compiled.get(script_path) {
            if !self.revalidate_mtime || cached.mtime == mtime {
                return Ok(cached.source.clone());
            }
        }

        let source = std::fs::read_to_string(script_path)?;
        compiled.insert(script_path.to_path_buf(), CachedScript { source: source.clone(), mtime });
        Ok(source)
    }

    fn touch_logger(&self, name: &str) {
        let mut loggers = self.loggers.lock();
        loggers.put(name.to_string(), ());
    }
}

#[async_trait]
impl ScriptService for QuickJsScriptService {
    async fn execute(
        &self,
        script_path: &Path,
        context: ScriptExecutionContext,
        stores: Option<Arc<dyn StoreFactory>>,
    ) -> Result<ResponseBehaviour> {
        let source = self.load_source(script_path)?;
        let logger_name = script_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        self.touch_logger(&logger_name);

        let script_path_owned = script_path.to_path_buf();
        let js_context = Context::full(&self.runtime).map_err(Error::from)?;

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            SCRIPT_TIMEOUT,
            tokio::task::spawn_blocking(move || run_script(&js_context, &source, context, stores)),
        )
        .await
        .map_err(|_| Error::script(script_path_owned.display().to_string(), "script execution timed out".to_string()))?
        .map_err(|join_error| {
            Error::script(script_path.display().to_string(), format!("script task panicked: {join_error}"))
        })?;
        metrics::record_script_duration(started.elapsed().as_secs_f64() * 1000.0);

        outcome.map_err(|message| Error::script(script_path.display().to_string(), message))
    }
}

/// Shared, request-local state the host-injected globals mutate.
struct ScriptState {
    builder: ResponseBehaviourBuilder,
}

fn run_script(
    js_context: &Context,
    source: &str,
    context: ScriptExecutionContext,
    stores: Option<Arc<dyn StoreFactory>>,
) -> std::result::Result<ResponseBehaviour, String> {
    let state = Rc::new(RefCell::new(ScriptState { builder: ResponseBehaviourBuilder::new() }));

    js_context.with(|ctx| -> std::result::Result<(), String> {
        install_globals(&ctx, &context, Rc::clone(&state), stores).map_err(|err| err.to_string())?;
        ctx.eval::<(), _>(source.as_bytes()).map_err(|err| format!("{err}"))?;
        Ok(())
    })?;

    let state = Rc::try_unwrap(state).map_err(|_| "script left dangling references".to_string())?.into_inner();
    Ok(state.builder.build(Some(&context.defaults), context.root_defaults.as_ref()))
}

fn install_globals(
    ctx: &Ctx<'_>,
    context: &ScriptExecutionContext,
    state: Rc<RefCell<ScriptState>>,
    stores: Option<Arc<dyn StoreFactory>>,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let request_ctx = Object::new(ctx.clone())?;
    request_ctx.set("method", context.method.clone())?;
    request_ctx.set("path", context.path.clone())?;
    request_ctx.set("body", context.body.clone())?;
    request_ctx.set("query", map_to_object(ctx, &context.query)?)?;
    request_ctx.set("headers", map_to_object(ctx, &context.headers)?)?;
    request_ctx.set("pathParams", map_to_object(ctx, &context.path_params)?)?;
    globals.set("context", request_ctx)?;

    globals.set("env", map_to_object(ctx, &context.env)?)?;

    let logger = Object::new(ctx.clone())?;
    logger.set("info", Function::new(ctx.clone(), |message: String| tracing::info!(%message, "script log"))?)?;
    logger.set("warn", Function::new(ctx.clone(), |message: String| tracing::warn!(%message, "script log"))?)?;
    logger.set("error", Function::new(ctx.clone(), |message: String| tracing::error!(%message, "script log"))?)?;
    globals.set("logger", logger)?;

    let response_object = build_response_builder_object(ctx, state)?;
    let respond_fn = {
        let response_object = response_object.clone();
        Function::new(ctx.clone(), move || -> rquickjs::Result<Object<'_>> { Ok(response_object.clone()) })?
    };
    globals.set("respond", respond_fn)?;

    if let Some(store_factory) = stores {
        globals.set("stores", build_stores_object(ctx, store_factory)?)?;
    }

    Ok(())
}

/// Throw a plain string as a JS exception, for surfacing store errors from
/// inside a host function back into the running script.
fn throw_message(ctx: &Ctx<'_>, message: impl AsRef<str>) -> rquickjs::Error {
    Exception::throw_message(ctx, message.as_ref())
}

/// Stores hold `serde_json::Value`s written by the capture engine, which
/// always writes strings (see `capture.rs`). Render anything else as its
/// JSON text rather than failing the script.
fn store_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The script DSL's `stores` handle (spec.md §4.4): `stores.open(name)`
/// returns an object exposing `save`/`load`/`hasKey`/`loadAll`/`delete`,
/// bridged onto the async [`Store`] trait. Scripts run inside
/// `spawn_blocking`, which keeps the ambient tokio runtime reachable, so
/// `Handle::current().block_on` doesn't deadlock against the in-memory
/// backend's synchronous locking.
fn build_stores_object<'js>(ctx: &Ctx<'js>, store_factory: Arc<dyn StoreFactory>) -> rquickjs::Result<Object<'js>> {
    let stores = Object::new(ctx.clone())?;

    stores.set(
        "open",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, name: String| -> rquickjs::Result<Object<'js>> {
            let store = tokio::runtime::Handle::current()
                .block_on(store_factory.open_or_create(&name))
                .map_err(|err| throw_message(&ctx, err.to_string()))?;
            build_store_proxy(&ctx, store)
        })?,
    )?;

    Ok(stores)
}

fn build_store_proxy<'js>(ctx: &Ctx<'js>, store: Arc<dyn Store>) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;

    let for_save = Arc::clone(&store);
    object.set(
        "save",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String, value: String| -> rquickjs::Result<()> {
            tokio::runtime::Handle::current()
                .block_on(for_save.save(&key, serde_json::Value::String(value)))
                .map_err(|err| throw_message(&ctx, err.to_string()))
        })?,
    )?;

    let for_load = Arc::clone(&store);
    object.set(
        "load",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<Option<String>> {
            let loaded = tokio::runtime::Handle::current()
                .block_on(for_load.load(&key))
                .map_err(|err| throw_message(&ctx, err.to_string()))?;
            Ok(loaded.as_ref().map(store_value_to_string))
        })?,
    )?;

    let for_has_key = Arc::clone(&store);
    object.set(
        "hasKey",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<bool> {
            tokio::runtime::Handle::current().block_on(for_has_key.has_key(&key)).map_err(|err| throw_message(&ctx, err.to_string()))
        })?,
    )?;

    let for_load_all = Arc::clone(&store);
    object.set(
        "loadAll",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| -> rquickjs::Result<Object<'js>> {
            let all = tokio::runtime::Handle::current()
                .block_on(for_load_all.load_all())
                .map_err(|err| throw_message(&ctx, err.to_string()))?;
            let stringified: HashMap<String, String> = all.iter().map(|(key, value)| (key.clone(), store_value_to_string(value))).collect();
            map_to_object(&ctx, &stringified)
        })?,
    )?;

    let for_delete = Arc::clone(&store);
    object.set(
        "delete",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, key: String| -> rquickjs::Result<()> {
            tokio::runtime::Handle::current().block_on(for_delete.delete(&key)).map_err(|err| throw_message(&ctx, err.to_string()))
        })?,
    )?;

    Ok(object)
}

fn map_to_object(ctx: &Ctx<'_>, map: &HashMap<String, String>) -> rquickjs::Result<Object<'_>> {
    let object = Object::new(ctx.clone())?;
    for (key, value) in map {
        object.set(key.as_str(), value.clone())?;
    }
    Ok(object)
}

/// Build the chainable `response`/`respond()` object. Every mutator method
/// mutates the shared [`ScriptState`] and returns the same object handle so
/// `respond().withStatusCode(200).withData("pong")`-style chains work.
fn build_response_builder_object<'js>(
    ctx: &Ctx<'js>,
    state: Rc<RefCell<ScriptState>>,
) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;

    macro_rules! chain_method {
        ($name:literal, $state:ident, $body:expr) => {{
            let object_handle = object.clone();
            let state = Rc::clone(&$state);
            object.set(
                $name,
                Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: rquickjs::function::Rest<JsValue<'js>>| -> rquickjs::Result<Object<'js>> {
                    let mut guard = state.borrow_mut();
                    $body(&mut guard.builder, &ctx, &args.0)?;
                    Ok(object_handle.clone())
                })?,
            )?;
        }};
    }

    chain_method!("withStatusCode", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        if let Some(status) = args.first().and_then(|v| v.as_int()) {
            b.with_status_code(status as u16);
        }
        Ok(())
    });
    chain_method!("withFile", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        if let Some(path) = args.first().and_then(|v| v.as_string()).and_then(|s| s.to_string().ok()) {
            b.with_file(path);
        }
        Ok(())
    });
    chain_method!("withData", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        if let Some(data) = args.first().and_then(|v| v.as_string()).and_then(|s| s.to_string().ok()) {
            b.with_data(data);
        }
        Ok(())
    });
    chain_method!("withHeader", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        let name = args.first().and_then(|v| v.as_string()).and_then(|s| s.to_string().ok());
        let value = args.get(1).and_then(|v| v.as_string()).and_then(|s| s.to_string().ok());
        if let (Some(name), Some(value)) = (name, value) {
            b.with_header(name, value);
        }
        Ok(())
    });
    chain_method!("withExampleName", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        if let Some(name) = args.first().and_then(|v| v.as_string()).and_then(|s| s.to_string().ok()) {
            b.with_example_name(name);
        }
        Ok(())
    });
    chain_method!("withEmpty", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        b.with_empty();
        Ok(())
    });
    chain_method!("withDelay", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        if let Some(ms) = args.first().and_then(|v| v.as_int()) {
            b.with_delay(ms.max(0) as u64);
        }
        Ok(())
    });
    chain_method!("withDelayRange", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        let min = args.first().and_then(|v| v.as_int());
        let max = args.get(1).and_then(|v| v.as_int());
        if let (Some(min), Some(max)) = (min, max) {
            b.with_delay_range(min.max(0) as u64, max.max(0) as u64);
        }
        Ok(())
    });
    chain_method!("usingDefaultBehaviour", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        b.using_default_behaviour();
        Ok(())
    });
    chain_method!("skipDefaultBehaviour", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        b.skip_default_behaviour();
        Ok(())
    });
    chain_method!("immediately", state, |b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> {
        b.skip_default_behaviour();
        Ok(())
    });
    chain_method!("and", state, |_b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> { Ok(()) });
    chain_method!("respond", state, |_b: &mut ResponseBehaviourBuilder, _ctx: &Ctx<'js>, _args: &[JsValue<'js>]| -> rquickjs::Result<()> { Ok(()) });

    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context() -> ScriptExecutionContext {
        ScriptExecutionContext {
            method: "GET".to_string(),
            path: "/last".to_string(),
            body: String::new(),
            query: HashMap::new(),
            headers: HashMap::new(),
            path_params: HashMap::new(),
            env: HashMap::new(),
            defaults: ResponseConfig::default(),
            root_defaults: None,
        }
    }

    #[tokio::test]
    async fn short_circuit_script_sets_status_and_skips_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "respond().withStatusCode(418).skipDefaultBehaviour();").unwrap();

        let service = QuickJsScriptService::new(true).unwrap();
        let behaviour = service.execute(file.path(), context(), None).await.unwrap();

        assert_eq!(behaviour.status, 418);
        assert_eq!(behaviour.mode, crate::behaviour::ResponseMode::ShortCircuit);
    }

    #[tokio::test]
    async fn data_script_sets_inline_body() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "respond().withData(\"widget\");").unwrap();

        let service = QuickJsScriptService::new(true).unwrap();
        let behaviour = service.execute(file.path(), context(), None).await.unwrap();

        match behaviour.body {
            crate::exchange::BodySource::Inline(data) => assert_eq!(data, "widget"),
            other => panic!("expected inline body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stores_global_round_trips_through_the_store_factory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "var items = stores.open('items'); items.save('last', 'widget'); respond().withData(items.load('last'));"
        )
        .unwrap();

        let service = QuickJsScriptService::new(true).unwrap();
        let factory: Arc<dyn StoreFactory> = Arc::new(crate::store::InMemoryStoreFactory::new());
        let behaviour = service.execute(file.path(), context(), Some(factory)).await.unwrap();

        match behaviour.body {
            crate::exchange::BodySource::Inline(data) => assert_eq!(data, "widget"),
            other => panic!("expected inline body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stores_global_is_absent_when_no_store_factory_is_passed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "respond().withData(typeof stores);").unwrap();

        let service = QuickJsScriptService::new(true).unwrap();
        let behaviour = service.execute(file.path(), context(), None).await.unwrap();

        match behaviour.body {
            crate::exchange::BodySource::Inline(data) => assert_eq!(data, "undefined"),
            other => panic!("expected inline body, got {other:?}"),
        }
    }
}
