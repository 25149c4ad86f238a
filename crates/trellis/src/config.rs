// File: src/config.rs
// Purpose: Configuration parsing from trellis.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use trellis_router::ManifestConfig;

use crate::app::{Paths, RenderOptions};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub prerender: PrerenderConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dev: DevConfig,
}

/// Source locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory containing route files (default: "src/routes")
    #[serde(default = "default_routes_dir")]
    pub routes: String,

    /// Directory of files served verbatim (default: "static")
    #[serde(default = "default_assets_dir")]
    pub assets: String,

    /// HTML document template (default: "src/app.html")
    #[serde(default = "default_template")]
    pub template: String,
}

/// URL prefixes
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// Prefix the app is mounted under, e.g. "/docs"
    #[serde(default)]
    pub base: String,

    /// Prefix for static and client assets, e.g. a CDN origin
    #[serde(default)]
    pub assets: String,
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Extensions of page component files
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// URL directory the client bundle is served from (default: "_app")
    #[serde(default = "default_app_dir")]
    pub app_dir: String,

    #[serde(default = "default_output_dir")]
    pub output: String,

    /// Directory holding the built client bundle
    #[serde(default = "default_client_dir")]
    pub client_dir: String,
}

/// Page rendering defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_true")]
    pub ssr: bool,

    #[serde(default = "default_true")]
    pub router: bool,

    #[serde(default = "default_true")]
    pub hydrate: bool,

    /// CSS selector of the element the client app mounts into
    #[serde(default)]
    pub target: Option<String>,

    /// Host used when a request does not carry one
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_false")]
    pub dev: bool,
}

/// Static export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerenderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Follow links found in rendered pages
    #[serde(default = "default_true")]
    pub crawl: bool,

    /// Render every page, not just those marked prerenderable
    #[serde(default = "default_false")]
    pub force: bool,

    /// Seed paths; "*" expands to every non-parameterized page
    #[serde(default = "default_prerender_pages")]
    pub pages: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

/// Development configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default = "default_true")]
    pub hot_reload: bool,

    #[serde(default = "default_watch_paths")]
    pub watch_paths: Vec<String>,
}

// Default values
fn default_routes_dir() -> String {
    "src/routes".to_string()
}

fn default_assets_dir() -> String {
    "static".to_string()
}

fn default_template() -> String {
    "src/app.html".to_string()
}

fn default_extensions() -> Vec<String> {
    vec![".rsx".to_string()]
}

fn default_app_dir() -> String {
    "_app".to_string()
}

fn default_output_dir() -> String {
    "build".to_string()
}

fn default_client_dir() -> String {
    ".trellis/output/client".to_string()
}

fn default_prerender_pages() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_watch_paths() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

// Default implementations
impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            routes: default_routes_dir(),
            assets: default_assets_dir(),
            template: default_template(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            app_dir: default_app_dir(),
            output: default_output_dir(),
            client_dir: default_client_dir(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ssr: true,
            router: true,
            hydrate: true,
            target: None,
            host: None,
            dev: false,
        }
    }
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            crawl: true,
            force: false,
            pages: default_prerender_pages(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            hot_reload: true,
            watch_paths: default_watch_paths(),
        }
    }
}

impl Config {
    /// Load configuration from trellis.toml
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Missing or empty files fall back to defaults
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Load configuration from default path (./trellis.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("trellis.toml")
    }

    /// Manifest builder inputs rooted at `root`
    pub fn manifest_config(&self, root: impl Into<PathBuf>) -> ManifestConfig {
        ManifestConfig::default()
            .with_root(root)
            .with_routes(&self.files.routes)
            .with_assets(&self.files.assets)
            .with_extensions(self.build.extensions.iter().cloned())
    }

    /// Render options for serving requests
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            dev: self.render.dev,
            ssr: self.render.ssr,
            router: self.render.router,
            hydrate: self.render.hydrate,
            target: self.render.target.clone(),
            host: self.render.host.clone(),
            app_dir: self.build.app_dir.clone(),
            paths: Paths {
                base: self.paths.base.clone(),
                assets: self.paths.assets.clone(),
            },
            ..RenderOptions::default()
        }
    }
}
