//! `Store` and `StoreFactory`: named key/value containers used by the
//! capture engine and the script DSL's `stores` handle. The core ships one
//! in-memory backend; external backends (Redis, DynamoDB, ...) are expected
//! to implement the same traits and be wired in by the process that
//! constructs the `StoreFactory`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result};

/// A named key/value container. Implementations must be safe to share
/// across concurrently-running requests; the core makes no ordering
/// guarantees between concurrent writers to the same key beyond
/// last-writer-wins on `save`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write `value` under `key`, overwriting any existing value.
    async fn save(&self, key: &str, value: Value) -> Result<()>;

    /// Read the value under `key`, if present.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Whether `key` currently has a value.
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// All entries currently in the store.
    async fn load_all(&self) -> Result<HashMap<String, Value>>;

    /// Remove `key`, if present. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Number of entries currently in the store.
    async fn count(&self) -> Result<usize>;

    /// A short, human-readable description of the backend (e.g.
    /// `"in-memory"`), surfaced for diagnostics.
    fn type_description(&self) -> &str;
}

/// Opens or creates named stores. Exactly one factory exists per process;
/// it is constructed once at startup and is otherwise read-only from the
/// pipeline's point of view (the factory itself is free to lazily create
/// backing stores on first open).
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open the named store, creating it with the factory's default
    /// backend if it does not yet exist.
    async fn open_or_create(&self, name: &str) -> Result<Arc<dyn Store>>;
}

#[derive(Default)]
struct InMemoryStoreState {
    entries: HashMap<String, Value>,
}

/// The default in-memory [`Store`] backend: a process-local
/// `RwLock<HashMap<..>>`. Round-trips any `serde_json::Value` without
/// further serialisation since no external boundary is crossed.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<InMemoryStoreState>,
}

impl InMemoryStore {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save(&self, key: &str, value: Value) -> Result<()> {
        self.state.write().entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.read().entries.get(key).cloned())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.state.read().entries.contains_key(key))
    }

    async fn load_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.state.read().entries.clone())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.write().entries.remove(key);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn type_description(&self) -> &str {
        "in-memory"
    }
}

/// A [`StoreFactory`] that always opens [`InMemoryStore`]s, caching one
/// instance per name for the life of the process.
#[derive(Default)]
pub struct InMemoryStoreFactory {
    stores: RwLock<HashMap<String, Arc<dyn Store>>>,
}

impl InMemoryStoreFactory {
    /// A fresh factory with no stores yet opened.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreFactory for InMemoryStoreFactory {
    async fn open_or_create(&self, name: &str) -> Result<Arc<dyn Store>> {
        if let Some(store) = self.stores.read().get(name) {
            return Ok(Arc::clone(store));
        }
        let mut stores = self.stores.write();
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::new()) as Arc<dyn Store>);
        Ok(Arc::clone(store))
    }
}

/// Convenience used by the capture engine: open the named store and save
/// in one call, mapping any failure onto [`Error::Store`].
pub async fn save_to_store(
    factory: &dyn StoreFactory,
    store_name: &str,
    key: &str,
    value: Value,
) -> Result<()> {
    let store = factory
        .open_or_create(store_name)
        .await
        .map_err(|err| Error::store(format!("opening store '{store_name}': {err}")))?;
    store
        .save(key, value)
        .await
        .map_err(|err| Error::store(format!("saving to store '{store_name}': {err}")))
}
