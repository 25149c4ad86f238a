// File: src/loader.rs
// Purpose: Path-keyed module cache with a reverse-dependency graph for dev invalidation

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use trellis_router::ComponentRef;

use crate::error::ModuleError;
use crate::module::{ComponentModule, DefaultError, DefaultLayout, EndpointModule};

/// Resolves manifest entries to loaded modules
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn component(&self, component: &ComponentRef)
        -> Result<Arc<ComponentModule>, ModuleError>;

    async fn endpoint(&self, file: &str) -> Result<Arc<EndpointModule>, ModuleError>;

    /// Drops cached modules affected by a change to `path`, returning their ids
    async fn invalidate(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }
}

pub type ComponentFactory = Arc<dyn Fn() -> anyhow::Result<ComponentModule> + Send + Sync>;
pub type EndpointFactory = Arc<dyn Fn() -> anyhow::Result<EndpointModule> + Send + Sync>;

#[derive(Clone)]
enum Factory {
    Component(ComponentFactory),
    Endpoint(EndpointFactory),
}

#[derive(Clone)]
enum Cached {
    Component(Arc<ComponentModule>),
    Endpoint(Arc<EndpointModule>),
}

/// Module registry keyed by source path
///
/// Factories are instantiated on first use and cached. The graph maps each
/// module to the set of modules importing it, so invalidating a file also
/// drops everything that (directly or not) depends on it.
///
/// # Examples
///
/// ```
/// use trellis::{ComponentModule, ModuleRegistry, Rendered};
///
/// let registry = ModuleRegistry::new()
///     .with_component("src/routes/index.rsx", || {
///         Ok(ComponentModule::from_fn(|_, _, _| Ok(Rendered::html("<h1>Home</h1>"))))
///     })
///     .with_import("src/routes/index.rsx", "src/lib/nav.rsx");
/// ```
pub struct ModuleRegistry {
    factories: HashMap<String, Factory>,
    cache: RwLock<HashMap<String, Cached>>,
    importers: RwLock<HashMap<String, HashSet<String>>>,
    default_layout: Arc<ComponentModule>,
    default_error: Arc<ComponentModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
            importers: RwLock::new(HashMap::new()),
            default_layout: Arc::new(ComponentModule::new(DefaultLayout)),
            default_error: Arc::new(ComponentModule::new(DefaultError)),
        }
    }

    pub fn with_component<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<ComponentModule> + Send + Sync + 'static,
    {
        self.factories
            .insert(id.into(), Factory::Component(Arc::new(factory)));
        self
    }

    pub fn with_endpoint<F>(mut self, file: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<EndpointModule> + Send + Sync + 'static,
    {
        self.factories
            .insert(file.into(), Factory::Endpoint(Arc::new(factory)));
        self
    }

    /// Records that `importer` depends on `imported`
    pub fn with_import(mut self, importer: &str, imported: &str) -> Self {
        self.importers
            .get_mut()
            .entry(imported.to_string())
            .or_default()
            .insert(importer.to_string());
        self
    }

    pub async fn declare_import(&self, importer: &str, imported: &str) {
        self.importers
            .write()
            .await
            .entry(imported.to_string())
            .or_default()
            .insert(importer.to_string());
    }

    pub async fn is_cached(&self, id: &str) -> bool {
        self.cache.read().await.contains_key(id)
    }

    async fn instantiate(&self, id: &str) -> Result<Cached, ModuleError> {
        if let Some(cached) = self.cache.read().await.get(id) {
            return Ok(cached.clone());
        }

        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| ModuleError::NotFound(id.to_string()))?;

        let load_error = |e: anyhow::Error| ModuleError::Load {
            id: id.to_string(),
            message: format!("{:#}", e),
        };

        let module = match factory {
            Factory::Component(factory) => Cached::Component(Arc::new(factory().map_err(load_error)?)),
            Factory::Endpoint(factory) => Cached::Endpoint(Arc::new(factory().map_err(load_error)?)),
        };

        debug!("Loaded module {}", id);
        self.cache
            .write()
            .await
            .insert(id.to_string(), module.clone());

        Ok(module)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn component(
        &self,
        component: &ComponentRef,
    ) -> Result<Arc<ComponentModule>, ModuleError> {
        let id = match component {
            ComponentRef::DefaultLayout => return Ok(self.default_layout.clone()),
            ComponentRef::DefaultError => return Ok(self.default_error.clone()),
            ComponentRef::File(id) => id,
        };

        match self.instantiate(id).await? {
            Cached::Component(module) => Ok(module),
            Cached::Endpoint(_) => Err(ModuleError::NotAComponent(id.clone())),
        }
    }

    async fn endpoint(&self, file: &str) -> Result<Arc<EndpointModule>, ModuleError> {
        match self.instantiate(file).await? {
            Cached::Endpoint(module) => Ok(module),
            Cached::Component(_) => Err(ModuleError::NotAnEndpoint(file.to_string())),
        }
    }

    async fn invalidate(&self, path: &str) -> Vec<String> {
        let mut cache = self.cache.write().await;
        let importers = self.importers.read().await;

        let mut invalidated = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![path.to_string()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }

            if cache.remove(&id).is_some() {
                invalidated.push(id.clone());
            }

            if let Some(parents) = importers.get(&id) {
                stack.extend(parents.iter().cloned());
            }
        }

        debug!("Invalidated {} module(s) for {}", invalidated.len(), path);
        invalidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Rendered;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(html: &'static str) -> anyhow::Result<ComponentModule> {
        Ok(ComponentModule::from_fn(move |_, _, _| Ok(Rendered::html(html))))
    }

    #[tokio::test]
    async fn test_modules_are_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ModuleRegistry::new().with_component("a.rsx", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            page("a")
        });

        let a = ComponentRef::File("a.rsx".into());
        registry.component(&a).await.unwrap();
        registry.component(&a).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_cached("a.rsx").await);
    }

    #[tokio::test]
    async fn test_invalidation_is_transitive() {
        let registry = ModuleRegistry::new()
            .with_component("page.rsx", || page("page"))
            .with_component("layout.rsx", || page("layout"))
            .with_component("other.rsx", || page("other"))
            .with_import("layout.rsx", "nav.rsx")
            .with_import("page.rsx", "layout.rsx");

        for id in ["page.rsx", "layout.rsx", "other.rsx"] {
            registry
                .component(&ComponentRef::File(id.into()))
                .await
                .unwrap();
        }

        let mut invalidated = registry.invalidate("nav.rsx").await;
        invalidated.sort();
        assert_eq!(invalidated, vec!["layout.rsx", "page.rsx"]);

        assert!(!registry.is_cached("page.rsx").await);
        assert!(registry.is_cached("other.rsx").await);

        // Reloading the modules and editing again invalidates them again
        for id in ["page.rsx", "layout.rsx"] {
            registry
                .component(&ComponentRef::File(id.into()))
                .await
                .unwrap();
        }
        let mut again = registry.invalidate("nav.rsx").await;
        again.sort();
        assert_eq!(again, vec!["layout.rsx", "page.rsx"]);
    }

    #[tokio::test]
    async fn test_declared_imports_survive_invalidation() {
        let registry = ModuleRegistry::new().with_component("page.rsx", || page("page"));
        registry.declare_import("page.rsx", "nav.rsx").await;

        let page_ref = ComponentRef::File("page.rsx".into());
        for _ in 0..3 {
            registry.component(&page_ref).await.unwrap();
            assert_eq!(registry.invalidate("nav.rsx").await, vec!["page.rsx"]);
            assert!(!registry.is_cached("page.rsx").await);
        }
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let registry = ModuleRegistry::new()
            .with_endpoint("api.rs", || Ok(EndpointModule::new()));

        let err = registry
            .component(&ComponentRef::File("api.rs".into()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ModuleError::NotAComponent(_)));

        let missing = registry.endpoint("missing.rs").await.err().unwrap();
        assert!(matches!(missing, ModuleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_builtin_components() {
        let registry = ModuleRegistry::new();
        assert!(registry.component(&ComponentRef::DefaultLayout).await.is_ok());
        assert!(registry.component(&ComponentRef::DefaultError).await.is_ok());
    }
}
