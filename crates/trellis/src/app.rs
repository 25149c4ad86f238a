// File: src/app.rs
// Purpose: Request renderer: endpoint dispatch, page pipeline, ETags

use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use trellis_router::{
    ComponentRef, EndpointRoute, Manifest, ManifestBuilder, Page, PageRoute, Params, Route,
};

use crate::config::Config;
use crate::error::PageError;
use crate::fetch::{FetchState, Fetcher};
use crate::hooks::{DefaultHooks, Hooks};
use crate::hydrate::{HydrateBlock, StartScript};
use crate::load::{LoadInput, LoadOutcome, Loaded, SessionHandle};
use crate::loader::ModuleLoader;
use crate::module::{
    handler_name, Component, EndpointBody, EndpointInput, EndpointResponse, NestedRoot,
    RenderContext, Rendered, Root,
};
use crate::request::{lowercase_keys, Headers, Request};
use crate::response::{Body, Response};
use crate::template::Template;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Options
// ============================================================================

/// URL prefixes the app is served under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    pub base: String,
    pub assets: String,
}

/// Client files of one component, relative to the app directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAssets {
    pub file: String,
    #[serde(default)]
    pub js: Vec<String>,
    #[serde(default)]
    pub css: Vec<String>,
}

/// Client build output: the runtime entry plus every component's assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub entry: ComponentAssets,
    /// Keyed by component id
    #[serde(default)]
    pub components: HashMap<String, ComponentAssets>,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            entry: ComponentAssets {
                file: "start.js".to_string(),
                ..ComponentAssets::default()
            },
            components: HashMap::new(),
        }
    }
}

impl BuildInfo {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build info: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info: {:?}", path))
    }
}

/// How pages are rendered
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dev: bool,
    pub ssr: bool,
    pub router: bool,
    pub hydrate: bool,
    /// Decline pages not marked prerenderable
    pub only_prerender: bool,
    /// Read static assets from `static_dir` instead of over HTTP
    pub local: bool,
    pub static_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub paths: Paths,
    pub app_dir: String,
    pub target: Option<String>,
    pub build: BuildInfo,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dev: false,
            ssr: true,
            router: true,
            hydrate: true,
            only_prerender: false,
            local: false,
            static_dir: None,
            host: None,
            paths: Paths::default(),
            app_dir: "_app".to_string(),
            target: None,
            build: BuildInfo::default(),
        }
    }
}

/// Per-render bookkeeping carried into internal fetches
#[derive(Debug, Clone, Default)]
pub(crate) struct RenderState {
    /// URL of the internal fetch being served, if any
    pub fetched: Option<String>,
    /// Page routes currently rendering further up the fetch stack
    pub initiators: Vec<String>,
}

// ============================================================================
// App
// ============================================================================

struct AppInner {
    manifest: Arc<RwLock<Arc<Manifest>>>,
    loader: Arc<dyn ModuleLoader>,
    hooks: Arc<dyn Hooks>,
    root: Arc<dyn Root>,
    template: Template,
    options: RenderOptions,
    http: reqwest::Client,
}

/// The renderer: turns a [`Request`] into a [`Response`]
///
/// Cheap to clone; clones share the manifest, so replacing it with
/// [`App::set_manifest`] is seen by every clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

pub struct AppBuilder {
    manifest: Manifest,
    loader: Arc<dyn ModuleLoader>,
    hooks: Arc<dyn Hooks>,
    root: Arc<dyn Root>,
    template: Template,
    options: RenderOptions,
}

impl AppBuilder {
    pub fn with_hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_root(mut self, root: impl Root + 'static) -> Self {
        self.root = Arc::new(root);
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> App {
        App {
            inner: Arc::new(AppInner {
                manifest: Arc::new(RwLock::new(Arc::new(self.manifest))),
                loader: self.loader,
                hooks: self.hooks,
                root: self.root,
                template: self.template,
                options: self.options,
                http: reqwest::Client::new(),
            }),
        }
    }
}

/// A page render in progress
struct PageRender<'r> {
    request: &'r Request,
    page: Page,
    chain: Vec<ComponentRef>,
    status: u16,
    error: Option<PageError>,
    session: Arc<Value>,
    state: RenderState,
}

impl PageRender<'_> {
    fn into_error(self, chain: Vec<ComponentRef>, error: PageError) -> Self {
        Self {
            chain,
            status: error.status,
            error: Some(error),
            ..self
        }
    }
}

impl App {
    pub fn builder(manifest: Manifest, loader: Arc<dyn ModuleLoader>) -> AppBuilder {
        AppBuilder {
            manifest,
            loader,
            hooks: Arc::new(DefaultHooks),
            root: Arc::new(NestedRoot),
            template: Template::default(),
            options: RenderOptions::default(),
        }
    }

    /// Builds the manifest, template and options described by `config`
    ///
    /// `root` is the project directory the configured paths are relative to.
    /// The template falls back to the built-in one when its file is missing,
    /// and `build.json` in the client directory is read when present.
    pub fn from_config(
        config: &Config,
        root: impl AsRef<Path>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<AppBuilder> {
        let root = root.as_ref();

        let manifest = ManifestBuilder::new(config.manifest_config(root))
            .build()
            .context("Failed to build route manifest")?;

        let template_path = root.join(&config.files.template);
        let template = if template_path.exists() {
            Template::load(&template_path)?
        } else {
            Template::default()
        };

        let mut options = config.render_options();
        let build_info = root.join(&config.build.client_dir).join("build.json");
        if build_info.exists() {
            options.build = BuildInfo::load(&build_info)?;
        }

        info!(
            "Loaded {} page(s) and {} endpoint(s)",
            manifest.pages.len(),
            manifest.endpoints.len()
        );

        Ok(Self::builder(manifest, loader)
            .with_template(template)
            .with_options(options))
    }

    pub fn options(&self) -> &RenderOptions {
        &self.inner.options
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.inner.loader
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Current manifest snapshot
    pub async fn manifest(&self) -> Arc<Manifest> {
        self.inner.manifest.read().await.clone()
    }

    /// Replaces the manifest for every clone of this app
    pub async fn set_manifest(&self, manifest: Manifest) {
        *self.inner.manifest.write().await = Arc::new(manifest);
    }

    /// An app sharing this one's manifest and modules with other options
    pub fn with_render_options(&self, options: RenderOptions) -> App {
        App {
            inner: Arc::new(AppInner {
                manifest: self.inner.manifest.clone(),
                loader: self.inner.loader.clone(),
                hooks: self.inner.hooks.clone(),
                root: self.inner.root.clone(),
                template: self.inner.template.clone(),
                options,
                http: self.inner.http.clone(),
            }),
        }
    }

    /// Renders a request
    ///
    /// `None` means no route matched or the page declined to render; the
    /// caller answers 404.
    pub async fn render(&self, request: &Request) -> Option<Response> {
        self.ssr(request.clone(), RenderState::default()).await
    }

    pub(crate) fn ssr(&self, request: Request, state: RenderState) -> BoxFuture<'_, Option<Response>> {
        Box::pin(async move {
            if request.path.len() > 1 && request.path.ends_with('/') {
                let path = &request.path[..request.path.len() - 1];
                let location = if request.query.is_empty() {
                    path.to_string()
                } else {
                    format!("{}?{}", path, request.query.as_str())
                };
                return Some(Response::redirect(301, location));
            }

            match self.respond(&request, &state).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Failed to render {}: {:?}", request.path, e);
                    let body = if self.inner.options.dev {
                        format!("{:?}", e)
                    } else {
                        e.to_string()
                    };
                    Some(Response::text(500, body))
                }
            }
        })
    }

    async fn respond(&self, request: &Request, state: &RenderState) -> Result<Option<Response>> {
        let prepared = self
            .inner
            .hooks
            .prepare(&request.headers)
            .await
            .context("prepare hook failed")?;

        let manifest = self.manifest().await;

        let response = match manifest.resolve(&request.path) {
            Some((Route::Endpoint(endpoint), params)) => Some(
                self.render_endpoint(request, endpoint, params, prepared.context.clone())
                    .await?,
            ),
            Some((Route::Page(page), params)) => {
                self.render_page(request, Some((page, params)), &prepared.context, state)
                    .await?
            }
            None => {
                self.render_page(request, None, &prepared.context, state)
                    .await?
            }
        };

        let Some(mut response) = response else {
            return Ok(None);
        };

        if response.status == 200 {
            let cacheable = response
                .header("cache-control")
                .map_or(true, |cc| !cc.contains("no-store") && !cc.contains("immutable"));

            if cacheable {
                let body = response.body.as_ref().map(Body::as_bytes).unwrap_or_default();
                let etag = format!("\"{}\"", blake3::hash(body).to_hex());

                if request.header("if-none-match") == Some(etag.as_str()) {
                    return Ok(Some(Response::new(304)));
                }

                response.headers.insert("etag".to_string(), etag);
            }
        }

        let mut headers = lowercase_keys(prepared.headers);
        headers.append(&mut response.headers);
        response.headers = headers;

        Ok(Some(response))
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    async fn render_endpoint(
        &self,
        request: &Request,
        route: &EndpointRoute,
        params: Params,
        context: Value,
    ) -> Result<Response> {
        let module = self.inner.loader.endpoint(&route.file).await?;

        let Some(handler) = module.handler(&handler_name(&request.method)) else {
            return Ok(Response::text(
                501,
                format!("{} is not implemented for {}", request.method, request.path),
            ));
        };

        let input = EndpointInput {
            host: self.host_for(request),
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            params,
            headers: request.headers.clone(),
        };

        match handler.handle(input, context).await {
            Ok(output) => Ok(endpoint_response(&request.path, output)),
            Err(e) => {
                error!("Endpoint {} failed: {:?}", route.file, e);
                Ok(Response::text(500, e.to_string()))
            }
        }
    }

    // ========================================================================
    // Pages
    // ========================================================================

    fn host_for(&self, request: &Request) -> String {
        request
            .host
            .clone()
            .or_else(|| self.inner.options.host.clone())
            .unwrap_or_default()
    }

    async fn render_page(
        &self,
        request: &Request,
        route: Option<(&PageRoute, Params)>,
        context: &Value,
        state: &RenderState,
    ) -> Result<Option<Response>> {
        let mut initiators = state.initiators.clone();

        let (chain, status, error, params) = match route {
            Some((page, params)) => {
                let id = page.pattern.regex_source();
                if initiators.iter().any(|initiator| initiator == id) {
                    return Ok(Some(Response::text(
                        404,
                        format!("Not found: {}", request.path),
                    )));
                }
                initiators.push(id.to_string());
                (page.components.clone(), 200, None, params)
            }
            None => (
                self.manifest().await.error_chain(),
                404,
                Some(PageError::new(404, format!("Not found: {}", request.path))),
                Params::new(),
            ),
        };

        let session = self
            .inner
            .hooks
            .get_session(context)
            .await
            .context("get_session hook failed")?;

        let render = PageRender {
            request,
            page: Page {
                host: self.host_for(request),
                path: request.path.clone(),
                query: request.query.clone(),
                params,
            },
            chain,
            status,
            error,
            session: Arc::new(session),
            state: RenderState {
                fetched: state.fetched.clone(),
                initiators,
            },
        };

        match self.get_response(render).await? {
            Some(response) => Ok(Some(response)),
            None => Ok(state.fetched.as_ref().map(|url| {
                Response::text(
                    500,
                    format!("Bad request in load function: failed to fetch {}", url),
                )
            })),
        }
    }

    /// Renders `r` again through the error chain
    fn render_error<'a>(
        &'a self,
        r: PageRender<'a>,
        error: PageError,
    ) -> BoxFuture<'a, Result<Option<Response>>> {
        Box::pin(async move {
            let chain = self.manifest().await.error_chain();
            self.get_response(r.into_error(chain, error)).await
        })
    }

    fn get_response<'a>(&'a self, mut r: PageRender<'a>) -> BoxFuture<'a, Result<Option<Response>>> {
        Box::pin(async move {
            let options = &self.inner.options;
            let is_error = r.error.is_some();

            if let Some(error) = r.error.as_mut() {
                if !options.dev {
                    error.stack = Some(format!("{}: {}", error.name, error.message));
                }
            }

            let loads = r.chain.iter().map(|c| self.inner.loader.component(c));
            let loaded_modules = try_join_all(loads).await;
            let modules = match loaded_modules {
                Ok(modules) => modules,
                Err(e) if !is_error => {
                    error!("Failed to load components for {}: {}", r.page.path, e);
                    let error = PageError::new(500, e.to_string());
                    return self.render_error(r, error).await;
                }
                Err(e) => return Err(e.into()),
            };

            let Some(leaf) = modules.last() else {
                anyhow::bail!("Empty component chain for {}", r.page.path);
            };

            let (ssr, router, hydrate) = if is_error {
                (options.ssr, options.router, options.hydrate)
            } else {
                (
                    leaf.ssr.unwrap_or(options.ssr),
                    leaf.router.unwrap_or(options.router),
                    leaf.hydrate.unwrap_or(options.hydrate),
                )
            };

            if options.only_prerender && (is_error || !leaf.prerender) {
                return Ok(None);
            }

            // Load functions, outermost first
            let uses_credentials = Arc::new(AtomicBool::new(false));
            let fetch_state = Arc::new(FetchState::new(uses_credentials.clone()));
            let fetcher = Fetcher::new(
                self.clone(),
                r.request.clone(),
                r.state.clone(),
                fetch_state.clone(),
                hydrate,
            );

            let mut context = Map::new();
            let mut maxage = None;
            let mut props = Vec::with_capacity(modules.len());

            // Client-only pages load in the browser
            let levels = if ssr { modules.len() } else { 0 };

            for (i, module) in modules.iter().take(levels).enumerate() {
                let is_leaf = i == modules.len() - 1;

                let Some(load) = &module.load else {
                    props.push(Value::Object(Map::new()));
                    continue;
                };

                let input = LoadInput {
                    page: r.page.clone(),
                    fetch: fetcher.clone(),
                    context: context.clone(),
                    session: SessionHandle::new(r.session.clone(), uses_credentials.clone()),
                };

                let loaded = match load.load(input).await {
                    Ok(Some(loaded)) => loaded,
                    Ok(None) if is_leaf && !is_error => return Ok(None),
                    Ok(None) => Loaded::default(),
                    Err(e) if !is_error => {
                        error!("Load failed for {}: {:?}", r.page.path, e);
                        let error = PageError::from_anyhow(&e, 500);
                        return self.render_error(r, error).await;
                    }
                    Err(e) => return Err(e),
                };

                match loaded.normalize() {
                    LoadOutcome::Redirect { status, location } => {
                        return Ok(Some(Response::redirect(status, location)));
                    }
                    LoadOutcome::Error { error, .. } if !is_error => {
                        return self.render_error(r, error).await;
                    }
                    LoadOutcome::Error { error, .. } => return Err(error.into()),
                    LoadOutcome::Props {
                        props: level_props,
                        context: level_context,
                        maxage: level_maxage,
                    } => {
                        context.extend(level_context);
                        if level_maxage.is_some() {
                            maxage = level_maxage;
                        }
                        props.push(level_props);
                    }
                }
            }

            // Render
            let chain: Vec<(Arc<dyn Component>, Value)> = modules
                .iter()
                .map(|module| module.component.clone())
                .zip(props)
                .collect();

            let rendered = if ssr {
                let ctx = RenderContext {
                    page: &r.page,
                    status: r.status,
                    error: r.error.as_ref(),
                    session: r.session.as_ref(),
                    dev: options.dev,
                };
                self.inner.root.render(&chain, &ctx)
            } else {
                Ok(Rendered::default())
            };

            let rendered = match rendered {
                Ok(rendered) => rendered,
                Err(e) if !is_error => {
                    error!("Render failed for {}: {:?}", r.page.path, e);
                    let error = PageError::from_anyhow(&e, 500);
                    return self.render_error(r, error).await;
                }
                Err(e) => return Err(e),
            };

            // Document
            let prefix = format!("{}/{}", options.paths.assets, options.app_dir);
            let build = &options.build;

            let mut js = vec![format!("{}/{}", prefix, build.entry.file)];
            let mut css = Vec::new();
            collect_assets(&prefix, &build.entry, &mut js, &mut css);

            let mut nodes = Vec::with_capacity(r.chain.len());
            for component in &r.chain {
                match build.components.get(component.id()) {
                    Some(assets) => {
                        collect_assets(&prefix, assets, &mut js, &mut css);
                        nodes.push(format!("{}/{}", prefix, assets.file));
                    }
                    None => nodes.push(format!("{}/{}", prefix, component.id())),
                }
            }

            let blocks = fetch_state.take_blocks().await;
            let dependencies = fetch_state.take_dependencies().await;

            let mut head = vec![rendered.head];
            if !rendered.css.is_empty() {
                head.push(format!("<style>{}</style>", rendered.css));
            }
            head.extend(js.iter().map(|dep| format!("<link rel=\"modulepreload\" href=\"{}\">", dep)));
            head.extend(css.iter().map(|dep| format!("<link rel=\"stylesheet\" href=\"{}\">", dep)));

            if router || hydrate {
                let script = StartScript {
                    entry: format!("{}/{}", prefix, build.entry.file),
                    target: options.target.as_deref(),
                    paths: &options.paths,
                    session: r.session.as_ref(),
                    host: Some(r.page.host.as_str()).filter(|host| !host.is_empty()),
                    route: router,
                    spa: !ssr,
                    hydrate: (ssr && hydrate).then(|| HydrateBlock {
                        status: r.status,
                        error: r.error.as_ref(),
                        nodes,
                        page: &r.page,
                    }),
                };
                head.push(script.render());
            }

            let head = head
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n");

            let mut body = rendered.html;
            for block in &blocks {
                body.push('\n');
                body.push_str(&block.to_script());
            }

            let mut response = Response::new(r.status)
                .with_header("content-type", "text/html")
                .with_body(self.inner.template.render(&head, &body));

            if let Some(maxage) = maxage.filter(|age| *age > 0) {
                let scope = if uses_credentials.load(Ordering::Relaxed) {
                    "private"
                } else {
                    "public"
                };
                response = response.with_header("cache-control", format!("{}, max-age={}", scope, maxage));
            }

            response.dependencies = dependencies;

            debug!("Rendered {} ({})", r.page.path, r.status);
            Ok(Some(response))
        })
    }
}

fn collect_assets(
    prefix: &str,
    assets: &ComponentAssets,
    js: &mut Vec<String>,
    css: &mut Vec<String>,
) {
    for file in &assets.js {
        let url = format!("{}/{}", prefix, file);
        if !js.contains(&url) {
            js.push(url);
        }
    }
    for file in &assets.css {
        let url = format!("{}/{}", prefix, file);
        if !css.contains(&url) {
            css.push(url);
        }
    }
}

fn endpoint_response(path: &str, output: EndpointResponse) -> Response {
    let mut headers: Headers = lowercase_keys(output.headers);

    let body = match output.body {
        EndpointBody::Empty => None,
        EndpointBody::Text(text) => Some(Body::Text(text)),
        EndpointBody::Bytes(bytes) => Some(Body::Binary(bytes)),
        EndpointBody::Json(value) => {
            let is_json = headers
                .get("content-type")
                .map_or(true, |ct| ct.starts_with("application/json"));

            if is_json {
                headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| "application/json".to_string());
                Some(Body::Text(value.to_string()))
            } else if let Value::String(text) = value {
                Some(Body::Text(text))
            } else {
                return Response::text(
                    500,
                    format!(
                        "Invalid response from route {}: body must be a string or bytes unless content-type is application/json",
                        path
                    ),
                );
            }
        }
    };

    Response {
        status: output.status,
        headers,
        body,
        dependencies: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_endpoint_response() {
        let response = endpoint_response("/api", EndpointResponse::json(json!({"a": 1})));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.text_body(), r#"{"a":1}"#);
    }

    #[test]
    fn test_endpoint_headers_lowercased() {
        let response = endpoint_response(
            "/api",
            EndpointResponse::text("hi").with_header("X-Powered-By", "trellis"),
        );
        assert_eq!(response.headers.get("x-powered-by").map(String::as_str), Some("trellis"));
    }

    #[test]
    fn test_non_json_content_type_with_object_body() {
        let response = endpoint_response(
            "/api",
            EndpointResponse::json(json!({"a": 1})).with_header("content-type", "text/csv"),
        );
        assert_eq!(response.status, 500);
        assert!(response.text_body().contains("/api"));
    }

    #[test]
    fn test_build_info_defaults() {
        let info: BuildInfo = serde_json::from_str(r#"{"entry":{"file":"start-abc.js"}}"#).unwrap();
        assert_eq!(info.entry.file, "start-abc.js");
        assert!(info.components.is_empty());
    }
}
