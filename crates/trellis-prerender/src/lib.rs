//! # Trellis Prerender
//!
//! Static export for Trellis applications:
//! - Renders the configured seed pages (`*` expands to every page without
//!   parameters)
//! - Follows `a`, `link`, `img` and `source` references in the rendered HTML
//! - Writes HTML pages as `<path>/index.html` and other responses as `<path>`
//! - Writes `<meta>` refresh stubs for redirects
//! - Writes the responses fetched by load functions next to the pages using them
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis::{App, Config, ModuleRegistry};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load_default()?;
//! let app = App::from_config(&config, ".", Arc::new(ModuleRegistry::new()))?.build();
//!
//! let report = trellis_prerender::prerender(&app, &config, ".").await?;
//! println!("{} written, {} failed", report.written.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod crawler;
pub mod error;
pub mod links;
pub mod output;
pub mod renderer;
pub mod seeds;

pub use crawler::{CrawlOptions, CrawlReport, Crawler};
pub use error::{PrerenderError, Result};
pub use output::{FsWriter, OutputWriter};
pub use renderer::{AppRenderer, PageRenderer};

use std::path::Path;
use tracing::info;
use trellis::{App, Config};

/// Exports `app` as configured in `[prerender]`
///
/// Paths in `config` are relative to `root`. Returns an empty report when
/// prerendering is disabled.
pub async fn prerender(app: &App, config: &Config, root: impl AsRef<Path>) -> Result<CrawlReport> {
    if !config.prerender.enabled {
        info!("Prerendering disabled");
        return Ok(CrawlReport::default());
    }

    let root = root.as_ref();
    let out = root.join(&config.build.output);
    let static_dir = root.join(&config.files.assets);

    let seeds = seeds::expand(
        &config.prerender.pages,
        &root.join(&config.files.routes),
        &config.build.extensions,
    )?;

    let crawler = Crawler::new(
        AppRenderer::new(app, config.prerender.force, &static_dir),
        FsWriter::new(&out),
    )
    .with_options(CrawlOptions {
        crawl: config.prerender.crawl,
        app_dir: config.build.app_dir.clone(),
        static_dir: Some(static_dir),
        client_dir: Some(root.join(&config.build.client_dir)),
    });

    let report = crawler.crawl(seeds).await?;

    info!(
        "Prerendered {} file(s) to {:?}: {} redirect(s), {} failure(s)",
        report.written.len(),
        out,
        report.redirected.len(),
        report.failed.len()
    );

    Ok(report)
}

/// Writes the server manifest of `app` to `<out>/manifest.json`
pub async fn write_server_manifest(app: &App, writer: &impl OutputWriter) -> Result<()> {
    let manifest = app.manifest().await.to_server_manifest();
    let json = serde_json::to_string_pretty(&manifest)?;
    writer.write("manifest.json", json.as_bytes()).await
}
