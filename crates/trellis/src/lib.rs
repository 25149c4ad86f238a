//! # Trellis
//!
//! Server-side rendering for file-routed applications:
//! - Endpoints dispatched by HTTP method
//! - Pages rendered through nested layouts, each level with its own load function
//! - An in-process `fetch` for load functions, recording dependencies
//! - Hydration payloads, ETags and `304 Not Modified`
//! - An axum adapter with dev-mode hot reload
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis::{App, ComponentModule, Config, Loaded, ModuleRegistry, Rendered, Request};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let registry = ModuleRegistry::new().with_component("src/routes/index.rsx", || {
//!     Ok(ComponentModule::from_fn(|props, _ctx, _slot| {
//!         Ok(Rendered::html(format!("<h1>{}</h1>", props["title"])))
//!     })
//!     .with_load_fn(|_input| async {
//!         Ok::<_, anyhow::Error>(Some(Loaded::props(json!({ "title": "Home" }))))
//!     }))
//! });
//!
//! let config = Config::load_default()?;
//! let app = App::from_config(&config, ".", Arc::new(registry))?.build();
//!
//! let response = app.render(&Request::get("/")).await;
//! assert_eq!(response.map(|r| r.status), Some(200));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod adapter;
pub mod app;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hooks;
pub mod hot_reload;
pub mod hydrate;
pub mod load;
pub mod loader;
pub mod module;
pub mod request;
pub mod response;
pub mod template;

// Re-export framework types
pub use app::{App, AppBuilder, BuildInfo, ComponentAssets, Paths, RenderOptions};
pub use config::Config;
pub use error::{FetchError, ModuleError, PageError, RenderError};
pub use fetch::{Credentials, FetchOptions, FetchedResponse, Fetcher};
pub use hooks::{DefaultHooks, Hooks, Prepared};
pub use load::{Load, LoadInput, LoadOutcome, Loaded};
pub use loader::{ModuleLoader, ModuleRegistry};
pub use module::{
    Component, ComponentModule, EndpointBody, EndpointInput, EndpointModule, EndpointResponse,
    Handler, RenderContext, Rendered, Root, NestedRoot,
};
pub use request::{Headers, Request};
pub use response::{Body, Response};
pub use template::Template;

// Re-export the router crate
pub use trellis_router;
