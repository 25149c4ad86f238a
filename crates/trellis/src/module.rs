// File: src/module.rs
// Purpose: Contracts for compiled page components and endpoint modules

use async_trait::async_trait;
use maud::html;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use trellis_router::{Page, Params, Query};

use crate::error::PageError;
use crate::load::{Load, LoadFn, LoadInput, Loaded};
use crate::request::Headers;

// ============================================================================
// Components
// ============================================================================

/// Output of rendering a component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub head: String,
    pub css: String,
}

impl Rendered {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    pub fn with_head(mut self, head: impl Into<String>) -> Self {
        self.head = head.into();
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = css.into();
        self
    }
}

/// Request-level values every component can read while rendering
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub page: &'a Page,
    pub status: u16,
    pub error: Option<&'a PageError>,
    pub session: &'a Value,
    pub dev: bool,
}

/// A compiled view component
///
/// `slot` is the rendered HTML of the next component down the chain, absent
/// for the innermost one.
pub trait Component: Send + Sync {
    fn render(
        &self,
        props: &Value,
        ctx: &RenderContext<'_>,
        slot: Option<&str>,
    ) -> anyhow::Result<Rendered>;
}

/// Adapts a closure into a [`Component`]
pub struct FnComponent<F>(pub F);

impl<F> Component for FnComponent<F>
where
    F: Fn(&Value, &RenderContext<'_>, Option<&str>) -> anyhow::Result<Rendered> + Send + Sync,
{
    fn render(
        &self,
        props: &Value,
        ctx: &RenderContext<'_>,
        slot: Option<&str>,
    ) -> anyhow::Result<Rendered> {
        (self.0)(props, ctx, slot)
    }
}

/// Composes a component chain into a single rendering
pub trait Root: Send + Sync {
    fn render(
        &self,
        chain: &[(Arc<dyn Component>, Value)],
        ctx: &RenderContext<'_>,
    ) -> anyhow::Result<Rendered>;
}

/// Renders innermost first, nesting each result into its parent's slot
///
/// Heads and styles are concatenated outermost first.
#[derive(Debug, Clone, Copy, Default)]
pub struct NestedRoot;

impl Root for NestedRoot {
    fn render(
        &self,
        chain: &[(Arc<dyn Component>, Value)],
        ctx: &RenderContext<'_>,
    ) -> anyhow::Result<Rendered> {
        let mut html: Option<String> = None;
        let mut heads = Vec::with_capacity(chain.len());
        let mut styles = Vec::with_capacity(chain.len());

        for (component, props) in chain.iter().rev() {
            let rendered = component.render(props, ctx, html.as_deref())?;
            heads.push(rendered.head);
            styles.push(rendered.css);
            html = Some(rendered.html);
        }

        heads.reverse();
        styles.reverse();

        Ok(Rendered {
            html: html.unwrap_or_default(),
            head: heads.into_iter().filter(|h| !h.is_empty()).collect::<Vec<_>>().join("\n"),
            css: styles.into_iter().filter(|c| !c.is_empty()).collect::<Vec<_>>().join("\n"),
        })
    }
}

/// Layout used when the routes directory has no root `$layout`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLayout;

impl Component for DefaultLayout {
    fn render(
        &self,
        _props: &Value,
        _ctx: &RenderContext<'_>,
        slot: Option<&str>,
    ) -> anyhow::Result<Rendered> {
        Ok(Rendered::html(slot.unwrap_or_default()))
    }
}

/// Error page used when the routes directory has no root `$error`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultError;

impl Component for DefaultError {
    fn render(
        &self,
        _props: &Value,
        ctx: &RenderContext<'_>,
        _slot: Option<&str>,
    ) -> anyhow::Result<Rendered> {
        let message = ctx.error.map(|e| e.message.as_str()).unwrap_or_default();
        let stack = ctx.error.and_then(|e| e.stack.as_deref()).filter(|_| ctx.dev);

        let markup = html! {
            h1 { (ctx.status) }
            p { (message) }
            @if let Some(stack) = stack {
                pre { (stack) }
            }
        };

        let title = html! { title { (ctx.status) } };

        Ok(Rendered::html(markup.into_string()).with_head(title.into_string()))
    }
}

/// A loaded page or layout module
#[derive(Clone)]
pub struct ComponentModule {
    pub component: Arc<dyn Component>,
    pub load: Option<Arc<dyn Load>>,
    /// Per-page overrides of the render options
    pub ssr: Option<bool>,
    pub router: Option<bool>,
    pub hydrate: Option<bool>,
    pub prerender: bool,
}

impl ComponentModule {
    pub fn new(component: impl Component + 'static) -> Self {
        Self {
            component: Arc::new(component),
            load: None,
            ssr: None,
            router: None,
            hydrate: None,
            prerender: false,
        }
    }

    /// Module whose component is a plain function
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis::{ComponentModule, Rendered};
    ///
    /// let module = ComponentModule::from_fn(|props, _ctx, _slot| {
    ///     Ok(Rendered::html(format!("<h1>{}</h1>", props["title"])))
    /// })
    /// .with_prerender(true);
    /// assert!(module.prerender);
    /// ```
    pub fn from_fn<F>(render: F) -> Self
    where
        F: Fn(&Value, &RenderContext<'_>, Option<&str>) -> anyhow::Result<Rendered>
            + Send
            + Sync
            + 'static,
    {
        Self::new(FnComponent(render))
    }

    pub fn with_load(mut self, load: impl Load + 'static) -> Self {
        self.load = Some(Arc::new(load));
        self
    }

    /// Attaches an async closure as the module's load function
    pub fn with_load_fn<F, Fut>(self, load: F) -> Self
    where
        F: Fn(LoadInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Loaded>>> + Send + 'static,
    {
        self.with_load(LoadFn(load))
    }

    pub fn with_ssr(mut self, ssr: bool) -> Self {
        self.ssr = Some(ssr);
        self
    }

    pub fn with_router(mut self, router: bool) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_hydrate(mut self, hydrate: bool) -> Self {
        self.hydrate = Some(hydrate);
        self
    }

    pub fn with_prerender(mut self, prerender: bool) -> Self {
        self.prerender = prerender;
        self
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// What an endpoint handler receives
#[derive(Debug, Clone)]
pub struct EndpointInput {
    pub host: String,
    pub path: String,
    pub query: Query,
    pub body: Value,
    pub params: Params,
    pub headers: Headers,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EndpointBody {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    /// Serialized unless a non-JSON content type is set
    Json(Value),
}

/// What an endpoint handler returns
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: EndpointBody,
}

impl Default for EndpointResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: EndpointBody::Empty,
        }
    }
}

impl EndpointResponse {
    pub fn json(body: Value) -> Self {
        Self {
            body: EndpointBody::Json(body),
            ..Self::default()
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: EndpointBody::Text(body.into()),
            ..Self::default()
        }
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self {
            body: EndpointBody::Bytes(body),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Header names may use any case
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A request handler for one HTTP method
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, input: EndpointInput, context: Value)
        -> anyhow::Result<EndpointResponse>;
}

/// Adapts an async closure into a [`Handler`]
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(EndpointInput, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
{
    async fn handle(
        &self,
        input: EndpointInput,
        context: Value,
    ) -> anyhow::Result<EndpointResponse> {
        (self.0)(input, context).await
    }
}

/// A loaded endpoint module: handlers keyed by lowercased method name,
/// with `del` standing for DELETE
#[derive(Clone, Default)]
pub struct EndpointModule {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl EndpointModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, name: &str, handler: impl Handler + 'static) -> Self {
        self.handlers
            .insert(name.to_ascii_lowercase(), Arc::new(handler));
        self
    }

    fn with_fn<F, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_handler(name, FnHandler(handler))
    }

    pub fn get<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_fn("get", handler)
    }

    pub fn post<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_fn("post", handler)
    }

    pub fn put<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_fn("put", handler)
    }

    pub fn patch<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_fn("patch", handler)
    }

    pub fn del<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(EndpointInput, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<EndpointResponse>> + Send + 'static,
    {
        self.with_fn("del", handler)
    }

    pub fn handler(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }
}

/// Handler name for an HTTP method
pub fn handler_name(method: &str) -> String {
    let name = method.to_ascii_lowercase();
    if name == "delete" {
        "del".to_string()
    } else {
        name
    }
}
