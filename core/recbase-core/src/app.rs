//! The application object shared by every request.

use crate::config::AppConfig;
use crate::dao::Dao;
use crate::error::{ApiError, ApiResult};
use crate::realtime::{self, Broker};
use crate::registry::{HookRegistry, HookRegistryBuilder};
use crate::resolver::StoreResolver;
use recbase_model::{Catalog, Collection};
use recbase_rules::RuleEngine;
use recbase_storage::{MemoryStore, RecordStore, SqliteStore};
use std::fmt;
use std::sync::Arc;
use tracing::info;

struct AppInner {
    config: AppConfig,
    catalog: Arc<Catalog>,
    store: Arc<dyn RecordStore>,
    rules: RuleEngine,
    hooks: HookRegistry,
    realtime: Broker,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.inner.rules
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    pub fn realtime(&self) -> &Broker {
        &self.inner.realtime
    }

    /// An unbound data access handle.
    pub fn dao(&self) -> Dao {
        Dao::new(self.clone())
    }

    /// Resolver over committed records.
    pub fn resolver(&self) -> StoreResolver {
        StoreResolver::new(self.inner.catalog.clone(), self.inner.store.clone(), None)
    }

    /// Looks up a collection; unknown names are `NotFound`.
    pub fn collection(&self, name: &str) -> ApiResult<Arc<Collection>> {
        self.inner.catalog.get(name).cloned().ok_or(ApiError::NotFound)
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("collections", &self.inner.catalog.len())
            .field("subscribers", &self.inner.realtime.client_count())
            .finish()
    }
}

/// Assembles an [`App`]. Hooks can only be bound here.
#[derive(Default)]
pub struct AppBuilder {
    config: AppConfig,
    catalog: Option<Catalog>,
    store: Option<Arc<dyn RecordStore>>,
    hooks: HookRegistryBuilder,
}

impl AppBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the collections from the config.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Overrides the store selected by the config.
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn hooks(mut self, bind: impl FnOnce(&mut HookRegistryBuilder)) -> Self {
        bind(&mut self.hooks);
        self
    }

    /// Checks every collection rule, opens storage and freezes the hooks.
    pub fn build(self) -> ApiResult<App> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => self.config.catalog()?,
        };
        let catalog = Arc::new(catalog);

        let rules = RuleEngine::new();
        for name in catalog.names() {
            if let Some(collection) = catalog.get(name) {
                rules.validate_rules(collection, catalog.as_ref())?;
            }
        }

        let store: Arc<dyn RecordStore> = match (self.store, &self.config.storage.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::open(path, catalog.clone())?),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let mut hooks = self.hooks;
        realtime::install(&mut hooks);
        let realtime = Broker::new(self.config.realtime.channel_capacity);

        info!(collections = catalog.len(), "recbase app ready");
        Ok(App {
            inner: Arc::new(AppInner {
                config: self.config,
                catalog,
                store,
                rules,
                hooks: hooks.build(),
                realtime,
            }),
        })
    }
}
