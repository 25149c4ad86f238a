//! Manifest builder
//!
//! Walks the routes directory and produces the ordered page and endpoint
//! lists every other part of the framework shares.
//!
//! ```text
//! routes/
//! ├── $layout.rsx          → root layout (replaces the default)
//! ├── index.rsx            → /
//! ├── about.rsx            → /about
//! └── blog/
//!     ├── $layout.rsx      → layout for everything under /blog
//!     ├── index.rsx        → /blog
//!     ├── index.json.rs    → /blog.json (endpoint)
//!     ├── [slug].rsx       → /blog/:slug
//!     └── _helpers.rs      → ignored (private)
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assets::{self, Asset};
use crate::error::{Result, RouteError};
use crate::route::{compare_items, CompiledPattern, Params, Segment, SortKey};

// ============================================================================
// Configuration
// ============================================================================

/// Inputs of a manifest build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Project root; recorded component files are relative to it
    pub root: PathBuf,
    /// Routes directory, relative to `root`
    pub routes: PathBuf,
    /// Static assets directory, relative to `root`
    pub assets: PathBuf,
    /// File extensions treated as page components
    pub extensions: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            routes: PathBuf::from("src/routes"),
            assets: PathBuf::from("static"),
            extensions: vec![".rsx".to_string()],
        }
    }
}

impl ManifestConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_routes(mut self, routes: impl Into<PathBuf>) -> Self {
        self.routes = routes.into();
        self
    }

    pub fn with_assets(mut self, assets: impl Into<PathBuf>) -> Self {
        self.assets = assets.into();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Manifest Types
// ============================================================================

/// Reference to a component in a page's chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentRef {
    /// A component source file, relative to the project root
    File(String),
    /// Built-in layout that renders its child unchanged
    DefaultLayout,
    /// Built-in error page
    DefaultError,
}

impl ComponentRef {
    /// Stable identifier used as module key and in generated code
    pub fn id(&self) -> &str {
        match self {
            ComponentRef::File(file) => file,
            ComponentRef::DefaultLayout => "trellis:layout",
            ComponentRef::DefaultError => "trellis:error",
        }
    }
}

/// A URL pattern bound to a chain of nested components
#[derive(Debug, Clone)]
pub struct PageRoute {
    pub pattern: CompiledPattern,
    /// Root layout first, page component last
    pub components: Vec<ComponentRef>,
}

impl PageRoute {
    /// The page's own component
    pub fn page(&self) -> Option<&ComponentRef> {
        self.components.last()
    }
}

/// A URL pattern bound to a method-keyed handler module
#[derive(Debug, Clone)]
pub struct EndpointRoute {
    pub pattern: CompiledPattern,
    pub file: String,
}

/// A resolved route
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Page(&'a PageRoute),
    Endpoint(&'a EndpointRoute),
}

/// The compiled description of every route in an application
#[derive(Debug, Clone)]
pub struct Manifest {
    pub assets: Vec<Asset>,
    pub layout: ComponentRef,
    pub error: ComponentRef,
    /// Every discovered component file, in discovery order
    pub components: Vec<String>,
    pub pages: Vec<PageRoute>,
    pub endpoints: Vec<EndpointRoute>,
}

impl Manifest {
    /// Finds the route for `path`, endpoints first
    pub fn resolve(&self, path: &str) -> Option<(Route<'_>, Params)> {
        self.endpoint_for(path)
            .map(|(endpoint, params)| (Route::Endpoint(endpoint), params))
            .or_else(|| {
                self.page_for(path)
                    .map(|(page, params)| (Route::Page(page), params))
            })
    }

    /// First page route, in specificity order, matching `path`
    pub fn page_for(&self, path: &str) -> Option<(&PageRoute, Params)> {
        self.pages
            .iter()
            .find_map(|page| page.pattern.exec(path).map(|params| (page, params)))
    }

    pub fn endpoint_for(&self, path: &str) -> Option<(&EndpointRoute, Params)> {
        self.endpoints
            .iter()
            .find_map(|ep| ep.pattern.exec(path).map(|params| (ep, params)))
    }

    /// Component chain used to render error pages
    pub fn error_chain(&self) -> Vec<ComponentRef> {
        vec![self.layout.clone(), self.error.clone()]
    }

    /// Looks up a static asset by request path, also trying `path/index.html`
    pub fn asset_for(&self, path: &str) -> Option<&Asset> {
        let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
        let file = decoded.trim_start_matches('/');
        let file_html = if file.is_empty() {
            "index.html".to_string()
        } else {
            format!("{}/index.html", file.trim_end_matches('/'))
        };
        self.assets
            .iter()
            .find(|asset| asset.file == file || asset.file == file_html)
    }

    pub fn write_assets(&self, path: &Path) -> Result<()> {
        assets::write_assets(path, &self.assets)
    }

    /// Replaces the asset list with one read from an asset manifest file
    pub fn read_assets(mut self, path: &Path) -> Result<Self> {
        self.assets = assets::read_assets(path)?;
        Ok(self)
    }

    /// Serializable description of the routes for a hosted server
    pub fn to_server_manifest(&self) -> ServerManifest {
        ServerManifest {
            layout: self.layout.id().to_string(),
            error: self.error.id().to_string(),
            components: self.components.clone(),
            pages: self
                .pages
                .iter()
                .map(|page| ServerPage {
                    pattern: page.pattern.regex_source().to_string(),
                    params: page.pattern.param_names().to_vec(),
                    parts: page.components.iter().map(|c| c.id().to_string()).collect(),
                })
                .collect(),
            endpoints: self
                .endpoints
                .iter()
                .map(|endpoint| ServerEndpoint {
                    pattern: endpoint.pattern.regex_source().to_string(),
                    params: endpoint.pattern.param_names().to_vec(),
                    file: endpoint.file.clone(),
                })
                .collect(),
            assets: self.assets.clone(),
        }
    }
}

/// Route description written next to a static export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerManifest {
    pub layout: String,
    pub error: String,
    pub components: Vec<String>,
    pub pages: Vec<ServerPage>,
    pub endpoints: Vec<ServerEndpoint>,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPage {
    pub pattern: String,
    pub params: Vec<String>,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub pattern: String,
    pub params: Vec<String>,
    pub file: String,
}

// ============================================================================
// Builder
// ============================================================================

/// One accepted entry of a routes directory
#[derive(Debug)]
struct Item {
    basename: String,
    file: String,
    segment: Segment,
    is_dir: bool,
    is_index: bool,
    is_page: bool,
    route_suffix: String,
}

impl Item {
    fn sort_key(&self) -> SortKey<'_> {
        SortKey {
            parts: self.segment.parts(),
            is_index: self.is_index,
            is_spread: self.file.contains("[..."),
        }
    }
}

/// Builds a [`Manifest`] from the filesystem
///
/// # Examples
///
/// ```no_run
/// use trellis_router::{ManifestBuilder, ManifestConfig};
///
/// let manifest = ManifestBuilder::new(ManifestConfig::default()).build().unwrap();
/// for page in &manifest.pages {
///     println!("{} -> {:?}", page.pattern, page.page());
/// }
/// ```
pub struct ManifestBuilder {
    config: ManifestConfig,
    components: Vec<String>,
    pages: Vec<PageRoute>,
    endpoints: Vec<EndpointRoute>,
    seen_pages: HashMap<String, String>,
    seen_endpoints: HashMap<String, String>,
}

impl ManifestBuilder {
    pub fn new(config: ManifestConfig) -> Self {
        Self {
            config,
            components: Vec::new(),
            pages: Vec::new(),
            endpoints: Vec::new(),
            seen_pages: HashMap::new(),
            seen_endpoints: HashMap::new(),
        }
    }

    pub fn build(mut self) -> Result<Manifest> {
        let routes_dir = self.config.root.join(&self.config.routes);
        let routes_rel = self.config.routes.clone();

        let layout = self
            .find_component("$layout", &routes_rel)
            .map(ComponentRef::File)
            .unwrap_or(ComponentRef::DefaultLayout);
        let error = self
            .find_component("$error", &routes_rel)
            .map(ComponentRef::File)
            .unwrap_or(ComponentRef::DefaultError);

        if routes_dir.is_dir() {
            self.walk(&routes_rel, &[], &[layout.clone()])?;
        }

        let assets = assets::list_assets(&self.config.root.join(&self.config.assets))?;

        info!(
            pages = self.pages.len(),
            endpoints = self.endpoints.len(),
            assets = assets.len(),
            "Built route manifest"
        );

        Ok(Manifest {
            assets,
            layout,
            error,
            components: self.components,
            pages: self.pages,
            endpoints: self.endpoints,
        })
    }

    /// Finds `<name><ext>` in `dir` for the first configured extension
    fn find_component(&self, name: &str, dir: &Path) -> Option<String> {
        self.config.extensions.iter().find_map(|ext| {
            let rel = dir.join(format!("{}{}", name, ext));
            self.config
                .root
                .join(&rel)
                .is_file()
                .then(|| posixify(&rel))
        })
    }

    fn walk(&mut self, dir: &Path, parent: &[Segment], stack: &[ComponentRef]) -> Result<()> {
        let mut items = self.read_items(dir)?;
        items.sort_by(|a, b| compare_items(a.sort_key(), b.sort_key()));

        for item in items {
            let mut segments = parent.to_vec();

            if item.is_index {
                if !item.route_suffix.is_empty() {
                    match segments.pop() {
                        Some(last) => segments.push(last.with_suffix(&item.route_suffix)),
                        None => segments.push(item.segment.clone()),
                    }
                }
            } else {
                segments.push(item.segment.clone());
            }

            if item.is_dir {
                let child = dir.join(&item.basename);
                let mut stack = stack.to_vec();
                if let Some(layout) = self.find_component("$layout", &child) {
                    self.components.push(layout.clone());
                    stack.push(ComponentRef::File(layout));
                }
                self.walk(&child, &segments, &stack)?;
            } else if item.is_page {
                self.components.push(item.file.clone());

                let pattern = CompiledPattern::new(segments, true, &item.file)?;
                check_clash(&mut self.seen_pages, &pattern, &item.file)?;
                debug!(pattern = %pattern, file = %item.file, "Discovered page");

                let mut components = stack.to_vec();
                components.push(ComponentRef::File(item.file));
                self.pages.push(PageRoute {
                    pattern,
                    components,
                });
            } else {
                let pattern =
                    CompiledPattern::new(segments, item.route_suffix.is_empty(), &item.file)?;
                check_clash(&mut self.seen_endpoints, &pattern, &item.file)?;
                debug!(pattern = %pattern, file = %item.file, "Discovered endpoint");

                self.endpoints.push(EndpointRoute {
                    pattern,
                    file: item.file,
                });
            }
        }

        Ok(())
    }

    fn read_items(&self, dir: &Path) -> Result<Vec<Item>> {
        let abs = self.config.root.join(dir);
        let mut names = fs::read_dir(&abs)
            .map_err(|e| RouteError::io(&abs, e))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| RouteError::io(&abs, e))?;
        names.sort();

        let mut items = Vec::new();
        for basename in names {
            if should_skip(&basename) {
                continue;
            }

            let rel = dir.join(&basename);
            let file = posixify(&rel);
            let is_dir = self.config.root.join(&rel).is_dir();

            let ext = self
                .config
                .extensions
                .iter()
                .find(|ext| basename.ends_with(ext.as_str()))
                .cloned()
                .unwrap_or_else(|| extname(&basename).to_string());

            if !is_dir && !is_route_extension(&ext) {
                continue;
            }

            let stem = if is_dir {
                basename.as_str()
            } else {
                &basename[..basename.len() - ext.len()]
            };

            let segment = Segment::parse(stem, &file)?;
            let route_suffix = if is_dir {
                String::new()
            } else {
                route_suffix(&basename, &ext)
            };

            items.push(Item {
                is_index: !is_dir && basename.starts_with("index."),
                is_page: !is_dir && self.config.extensions.contains(&ext),
                basename,
                file,
                segment,
                is_dir,
                route_suffix,
            });
        }

        Ok(items)
    }
}

/// Records a pattern, failing when another file already compiled to it
fn check_clash(
    seen: &mut HashMap<String, String>,
    pattern: &CompiledPattern,
    file: &str,
) -> Result<()> {
    let key = pattern.regex_source().to_string();
    if let Some(first) = seen.get(&key) {
        return Err(RouteError::Clash {
            first: first.clone(),
            second: file.to_string(),
        });
    }
    seen.insert(key, file.to_string());
    Ok(())
}

/// `$layout`/`$error` markers, private `_` files and dotfiles other than
/// `.well-known` never become routes
fn should_skip(basename: &str) -> bool {
    basename.starts_with('$')
        || basename.starts_with('_')
        || (basename.starts_with('.') && basename != ".well-known")
}

/// Accepts `.ext` chains like `.rsx` or `.json.rs`, rejecting editor
/// temp files such as `page.rsx~`
fn is_route_extension(ext: &str) -> bool {
    match ext.strip_prefix('.') {
        Some(rest) => rest
            .split('.')
            .all(|piece| !piece.is_empty() && piece.chars().all(|c| c.is_ascii_alphanumeric())),
        None => false,
    }
}

/// Extension including the dot, from the last `.` that is not the first
/// character
fn extname(basename: &str) -> &str {
    match basename.rfind('.') {
        Some(i) if i > 0 => &basename[i..],
        _ => "",
    }
}

/// Text between the first dot and the extension, e.g. `.json` in
/// `index.json.rs`
fn route_suffix(basename: &str, ext: &str) -> String {
    let end = basename.len() - ext.len();
    match basename.find('.') {
        Some(start) if start < end => basename[start..end].to_string(),
        _ => String::new(),
    }
}

fn posixify(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip() {
        assert!(should_skip("$layout.rsx"));
        assert!(should_skip("_private.rsx"));
        assert!(should_skip(".hidden"));
        assert!(!should_skip(".well-known"));
        assert!(!should_skip("about.rsx"));
    }

    #[test]
    fn test_extname() {
        assert_eq!(extname("index.json.rs"), ".rs");
        assert_eq!(extname("about"), "");
        assert_eq!(extname(".well-known"), "");
    }

    #[test]
    fn test_route_suffix() {
        assert_eq!(route_suffix("index.json.rs", ".rs"), ".json");
        assert_eq!(route_suffix("about.rsx", ".rsx"), "");
        assert_eq!(route_suffix("[slug].json.rs", ".rs"), ".json");
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_route_extension(".rsx"));
        assert!(is_route_extension(".json.rs"));
        assert!(is_route_extension(".RS"));
        assert!(!is_route_extension(".rsx~"));
        assert!(!is_route_extension(""));
    }
}
