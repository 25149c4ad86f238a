// File: src/crawler.rs
// Purpose: Renders seed pages and everything reachable from them

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use trellis::{Body, Response};

use crate::error::Result;
use crate::links::{crawl_target, extract_hrefs};
use crate::output::{output_file, redirect_stub, OutputWriter};
use crate::renderer::PageRenderer;

/// Crawl behaviour
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Follow links found in rendered HTML
    pub crawl: bool,
    /// URL directory of the client bundle
    pub app_dir: String,
    /// Files served verbatim; links to them are not crawled
    pub static_dir: Option<PathBuf>,
    /// Built client bundle, served under `/{app_dir}`
    pub client_dir: Option<PathBuf>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            crawl: true,
            app_dir: "_app".to_string(),
            static_dir: None,
            client_dir: None,
        }
    }
}

/// Paths visited by a crawl, by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub written: Vec<String>,
    pub redirected: Vec<String>,
    pub failed: Vec<String>,
}

impl CrawlReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sequential, depth-first crawler
///
/// Each path is rendered at most once. Links are followed in document
/// order before the next link of the parent page.
pub struct Crawler<R, W> {
    renderer: R,
    writer: W,
    options: CrawlOptions,
}

impl<R: PageRenderer, W: OutputWriter> Crawler<R, W> {
    pub fn new(renderer: R, writer: W) -> Self {
        Self {
            renderer,
            writer,
            options: CrawlOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Renders every seed and, when crawling, every page reachable from them
    pub async fn crawl<I>(&self, seeds: I) -> Result<CrawlReport>
    where
        I: IntoIterator<Item = String>,
    {
        let mut report = CrawlReport::default();
        let mut seen = HashSet::new();

        let mut stack: Vec<String> = seeds.into_iter().collect();
        stack.reverse();

        while let Some(path) = stack.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }

            let Some(response) = self.renderer.render(&path).await else {
                debug!("Skipped {}", path);
                continue;
            };

            let html = is_html(&response);

            self.write_response(&path, &response, &mut report).await?;
            if response.is_redirect() {
                continue;
            }

            for (dependency, result) in &response.dependencies {
                self.write_response(dependency, result, &mut report).await?;
            }

            if html && self.options.crawl {
                let mut targets: Vec<String> = extract_hrefs(response.text_body())
                    .iter()
                    .filter_map(|href| crawl_target(&path, href))
                    .filter(|target| !seen.contains(target) && !self.is_static(target))
                    .collect();

                targets.reverse();
                stack.extend(targets);
            }
        }

        Ok(report)
    }

    /// Writes one response by status class and records the outcome
    async fn write_response(
        &self,
        path: &str,
        response: &Response,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let redirect = response.is_redirect();

        if !redirect && !response.is_success() {
            error!("{} {}", response.status, path);
            report.failed.push(path.to_string());
            return Ok(());
        }

        let Some(file) = output_file(path, redirect || is_html(response)) else {
            error!("Refusing to export {}: not a safe file name", path);
            report.failed.push(path.to_string());
            return Ok(());
        };

        if redirect {
            let location = response.header("location").unwrap_or("/");
            warn!("{} {} -> {}", response.status, path, location);
            self.writer
                .write(&file, redirect_stub(location).as_bytes())
                .await?;
            report.redirected.push(path.to_string());
        } else {
            info!("{} {}", response.status, path);
            self.writer.write(&file, body_bytes(response)).await?;
            report.written.push(path.to_string());
        }

        Ok(())
    }

    /// Whether `path` names a file that exists without rendering
    fn is_static(&self, path: &str) -> bool {
        let Some(file) = output_file(path, false) else {
            return false;
        };

        if let Some(client_dir) = &self.options.client_dir {
            let prefix = format!("{}/", self.options.app_dir);
            if let Some(rest) = file.strip_prefix(prefix.as_str()) {
                if client_dir.join(rest).is_file() {
                    return true;
                }
            }
        }

        if self.writer.contains(&file) {
            return true;
        }

        match &self.options.static_dir {
            Some(dir) => dir.join(&file).is_file() || dir.join(&file).join("index.html").is_file(),
            None => false,
        }
    }
}

fn is_html(response: &Response) -> bool {
    response
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("text/html"))
}

fn body_bytes(response: &Response) -> &[u8] {
    response.body.as_ref().map(Body::as_bytes).unwrap_or_default()
}
