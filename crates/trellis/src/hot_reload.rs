// File: src/hot_reload.rs
// Purpose: Dev-mode file watching, manifest rebuilds and module invalidation

use anyhow::Result;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower_livereload::Reloader;
use tracing::{error, info, warn};
use trellis_router::{ManifestBuilder, ManifestConfig};

use crate::app::App;
use crate::config::Config;

/// Type of file change that occurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeType {
    /// A file under the routes directory
    Route,
    /// A file under the static assets directory
    Asset,
    /// Any other source file
    Source,
}

/// Represents a file change event
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub change_type: ChangeType,
}

/// Hot reload watcher that monitors file system changes
pub struct HotReloadWatcher {
    tx: broadcast::Sender<FileChange>,
    _watcher: notify::RecommendedWatcher,
}

impl HotReloadWatcher {
    /// Watches `watch_paths`, broadcasting changes `classify` accepts
    pub fn new<F>(watch_paths: Vec<PathBuf>, classify: F) -> Result<Self>
    where
        F: Fn(&Path) -> Option<ChangeType> + Send + 'static,
    {
        let (tx, _) = broadcast::channel(100);
        let tx_clone = tx.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }

                    for path in event.paths {
                        let Some(change_type) = classify(&path) else {
                            continue;
                        };

                        info!("File changed: {:?} ({:?})", path, change_type);

                        // No receivers is fine
                        let _ = tx_clone.send(FileChange { path, change_type });
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            }
        })?;

        for path in watch_paths {
            if path.exists() {
                watcher.watch(&path, RecursiveMode::Recursive)?;
                info!("Watching: {:?}", path);
            } else {
                warn!("Path does not exist: {:?}", path);
            }
        }

        Ok(Self {
            tx,
            _watcher: watcher,
        })
    }

    /// Subscribe to file change events
    pub fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.tx.subscribe()
    }
}

/// Sorts a changed path into routes, assets or other sources
pub fn classify(path: &Path, routes: &Path, assets: &Path, extensions: &[String]) -> Option<ChangeType> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') || file_name.ends_with('~') {
        return None;
    }

    if is_within(path, assets) {
        return Some(ChangeType::Asset);
    }

    if is_within(path, routes) {
        return Some(ChangeType::Route);
    }

    let is_source = file_name.ends_with(".rs")
        || extensions.iter().any(|ext| file_name.ends_with(ext.as_str()));
    is_source.then_some(ChangeType::Source)
}

fn is_within(path: &Path, dir: &Path) -> bool {
    if path.starts_with(dir) {
        return true;
    }
    dir.canonicalize()
        .map(|dir| path.starts_with(dir))
        .unwrap_or(false)
}

/// Create a hot reload watcher for the configured project
pub fn create_watcher(config: &Config) -> Result<HotReloadWatcher> {
    let routes = PathBuf::from(&config.files.routes);
    let assets = PathBuf::from(&config.files.assets);
    let extensions = config.build.extensions.clone();

    let mut watch_paths: Vec<PathBuf> = config.dev.watch_paths.iter().map(PathBuf::from).collect();
    for dir in [&routes, &assets] {
        if !watch_paths.iter().any(|p| dir.starts_with(p)) {
            watch_paths.push(dir.clone());
        }
    }

    HotReloadWatcher::new(watch_paths, move |path| {
        classify(path, &routes, &assets, &extensions)
    })
}

/// Applies file changes to a running app
pub struct DevReloader {
    app: App,
    manifest_config: ManifestConfig,
    reloader: Option<Reloader>,
}

impl DevReloader {
    pub fn new(app: App, manifest_config: ManifestConfig) -> Self {
        Self {
            app,
            manifest_config,
            reloader: None,
        }
    }

    /// Browsers connected through this reloader refresh after each change
    pub fn with_reloader(mut self, reloader: Reloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Invalidates modules affected by `change` and rebuilds the manifest
    ///
    /// Returns the invalidated module ids. A failed rebuild keeps the
    /// previous manifest.
    pub async fn apply(&self, change: &FileChange) -> Result<Vec<String>> {
        let id = self.module_id(&change.path);
        let invalidated = self.app.loader().invalidate(&id).await;

        let manifest = ManifestBuilder::new(self.manifest_config.clone()).build()?;
        info!(
            "Rebuilt manifest: {} page(s), {} endpoint(s)",
            manifest.pages.len(),
            manifest.endpoints.len()
        );
        self.app.set_manifest(manifest).await;

        if let Some(reloader) = &self.reloader {
            reloader.reload();
        }

        Ok(invalidated)
    }

    /// Applies every change the watcher reports until it is dropped
    pub async fn run(self, watcher: HotReloadWatcher) {
        let mut changes = watcher.subscribe();
        let _watcher = watcher;

        loop {
            match changes.recv().await {
                Ok(change) => {
                    if let Err(e) = self.apply(&change).await {
                        error!("Reload failed for {:?}: {:#}", change.path, e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} file change(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Module id of a changed file: its path relative to the project root
    fn module_id(&self, path: &Path) -> String {
        let root = &self.manifest_config.root;
        let relative = path
            .strip_prefix(root)
            .ok()
            .map(Path::to_path_buf)
            .or_else(|| {
                let root = root.canonicalize().ok()?;
                path.strip_prefix(root).ok().map(Path::to_path_buf)
            })
            .unwrap_or_else(|| path.to_path_buf());

        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
