//! # Trellis Router
//!
//! File-system based routing for Trellis applications:
//! - Static routes (`about.rsx` → `/about`)
//! - Dynamic parameters (`[slug].rsx` → `/:slug`)
//! - Qualified parameters (`[id([0-9]+)].rsx` → digits only)
//! - Rest parameters (`[...path].rsx` → zero or more segments)
//! - Endpoints with route suffixes (`index.json.rs` → `/parent.json`)
//! - Nested `$layout` components and a root `$error` page
//!
//! Routes are compiled once into a [`Manifest`], whose page and endpoint
//! lists are in specificity order: the first pattern that matches a path
//! wins.
//!
//! ## Example
//!
//! ```
//! use trellis_router::route::compile;
//!
//! let pattern = compile("users/[id([0-9]+)]").unwrap();
//! assert_eq!(pattern.exec("/users/123").unwrap()["id"], "123");
//! assert!(!pattern.matches("/users/abc"));
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod assets;
pub mod client;
pub mod error;
pub mod manifest;
pub mod page;
pub mod path;
pub mod route;

pub use assets::Asset;
pub use client::{ClientManifest, ClientRouter, NavigationTarget, NavigationToken, Navigator};
pub use error::RouteError;
pub use manifest::{
    ComponentRef, EndpointRoute, Manifest, ManifestBuilder, ManifestConfig, PageRoute, Route,
    ServerManifest,
};
pub use page::{Page, Query};
pub use route::{compile, CompiledPattern, Params};
