//! Client router core
//!
//! The platform-independent half of client-side navigation: the generated
//! client manifest, URL selection against it and last-writer-wins
//! navigation bookkeeping. DOM wiring lives in the browser runtime.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

use crate::manifest::Manifest;
use crate::page::{Page, Query};
use crate::path::{canonical_path, strip_base};
use crate::route::{CompiledPattern, Params};

// ============================================================================
// Client Manifest
// ============================================================================

/// A page as seen by the client runtime
#[derive(Debug, Clone)]
pub struct ClientPage {
    pub pattern: CompiledPattern,
    /// Indices into [`ClientManifest::components`], outermost first
    pub parts: Vec<usize>,
}

/// Route data the client runtime imports
#[derive(Debug, Clone)]
pub struct ClientManifest {
    /// Root layout id
    pub layout: String,
    /// Component ids, in loader order
    pub components: Vec<String>,
    pub pages: Vec<ClientPage>,
    /// Server-only routes that must not be intercepted client-side
    pub ignore: Vec<CompiledPattern>,
}

impl ClientManifest {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut components: Vec<String> = Vec::new();
        let mut index_of = |id: &str| match components.iter().position(|c| c == id) {
            Some(i) => i,
            None => {
                components.push(id.to_string());
                components.len() - 1
            }
        };

        let pages = manifest
            .pages
            .iter()
            .map(|page| ClientPage {
                pattern: page.pattern.clone(),
                // the root layout is imported separately
                parts: page
                    .components
                    .iter()
                    .skip(1)
                    .map(|c| index_of(c.id()))
                    .collect(),
            })
            .collect();

        let page_patterns: HashSet<&str> = manifest
            .pages
            .iter()
            .map(|page| page.pattern.regex_source())
            .collect();

        let ignore = manifest
            .endpoints
            .iter()
            .filter(|ep| !page_patterns.contains(ep.pattern.regex_source()))
            .map(|ep| ep.pattern.clone())
            .collect();

        Self {
            layout: manifest.layout.id().to_string(),
            components,
            pages,
            ignore,
        }
    }

    /// Renders the manifest as an ES module
    ///
    /// Component ids are imported from `{prefix}/{id}`.
    pub fn to_module(&self, prefix: &str) -> String {
        let import = |id: &str| format!("{}/{}", prefix.trim_end_matches('/'), id);
        let mut out = String::new();

        let _ = writeln!(out, "// This file is generated. Do not edit it.");
        let _ = writeln!(out, "import * as layout from {};", json(&import(&self.layout)));
        let _ = writeln!(out);
        let _ = writeln!(out, "const d = decodeURIComponent;");
        let _ = writeln!(out);
        let _ = writeln!(out, "const components = [");
        for id in &self.components {
            let _ = writeln!(out, "\t() => import({}),", json(&import(id)));
        }
        let _ = writeln!(out, "];");
        let _ = writeln!(out);

        let _ = writeln!(out, "export const pages = [");
        for page in &self.pages {
            let parts = page
                .parts
                .iter()
                .map(|i| format!("components[{}]", i))
                .collect::<Vec<_>>()
                .join(", ");

            let _ = write!(
                out,
                "\t{{\n\t\tpattern: {},\n\t\tparts: [{}]",
                page.pattern, parts
            );

            if page.pattern.has_params() {
                let props = page
                    .pattern
                    .param_names()
                    .iter()
                    .enumerate()
                    .map(|(i, name)| format!("{}: d(m[{}] || '')", json(name), i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(out, ",\n\t\tparams: m => ({{ {} }})", props);
            }

            let _ = writeln!(out, "\n\t}},");
        }
        let _ = writeln!(out, "];");
        let _ = writeln!(out);

        let _ = writeln!(out, "export const ignore = [");
        for pattern in &self.ignore {
            let _ = writeln!(out, "\t{},", pattern);
        }
        let _ = writeln!(out, "];");
        let _ = writeln!(out);
        let _ = writeln!(out, "export {{ layout }};");

        out
    }
}

fn json(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

// ============================================================================
// Client Router
// ============================================================================

/// Result of selecting a URL against the client manifest
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTarget {
    pub href: String,
    /// Index into [`ClientManifest::pages`]
    pub route: usize,
    pub params: Params,
    pub page: Page,
}

/// Selects the client-side route for a URL
///
/// Constructed once by the application entry point and passed to whatever
/// handles navigation events.
///
/// # Examples
///
/// ```no_run
/// # use trellis_router::{ClientManifest, ClientRouter, Manifest};
/// # fn demo(manifest: &Manifest) {
/// let client = ClientManifest::from_manifest(manifest);
/// let router = ClientRouter::new("", "localhost:3000", &client);
///
/// let url = url::Url::parse("http://localhost:3000/blog/hello").unwrap();
/// if let Some(target) = router.select(&url) {
///     println!("page {} with {:?}", target.route, target.params);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientRouter<'a> {
    base: String,
    host: String,
    manifest: &'a ClientManifest,
}

impl<'a> ClientRouter<'a> {
    pub fn new(base: &str, host: &str, manifest: &'a ClientManifest) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            host: host.to_string(),
            manifest,
        }
    }

    /// Picks the page a same-origin URL navigates to
    ///
    /// Returns `None` for other origins, paths outside the base, ignored
    /// server routes and paths no page matches.
    pub fn select(&self, url: &Url) -> Option<NavigationTarget> {
        if authority(url)? != self.host {
            return None;
        }

        let path = strip_base(url.path(), &self.base)?;

        if self.manifest.ignore.iter().any(|p| p.matches(path)) {
            return None;
        }

        self.manifest
            .pages
            .iter()
            .enumerate()
            .find_map(|(index, page)| {
                let params = page.pattern.exec(path)?;
                Some(NavigationTarget {
                    href: url.to_string(),
                    route: index,
                    page: Page {
                        host: self.host.clone(),
                        path: path.to_string(),
                        query: Query::parse(url.query().unwrap_or("")),
                        params: params.clone(),
                    },
                    params,
                })
            })
    }
}

fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

// ============================================================================
// Navigation Tokens
// ============================================================================

/// Ticket for one in-flight navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationToken(u64);

/// Last-writer-wins navigation bookkeeping
///
/// Each navigation takes a token when it starts. When its render completes,
/// the result is only kept if no newer navigation started meanwhile.
#[derive(Debug, Default)]
pub struct Navigator {
    latest: AtomicU64,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> NavigationToken {
        NavigationToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: NavigationToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Keeps `value` only when `token` belongs to the newest navigation
    pub fn finish<T>(&self, token: NavigationToken, value: T) -> Option<T> {
        self.is_current(token).then_some(value)
    }

    /// Location to show after navigating: trailing slashes removed, search kept
    pub fn canonical_location<'p>(path: &'p str, search: &str) -> Cow<'p, str> {
        let path = canonical_path(path);
        if search.is_empty() {
            path
        } else {
            Cow::Owned(format!("{}?{}", path, search.trim_start_matches('?')))
        }
    }
}
