use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use trellis::{
    App, ComponentModule, Config, EndpointInput, EndpointModule, EndpointResponse, LoadInput,
    Loaded, ModuleRegistry, Rendered, Response,
};
use trellis_prerender::*;

// ============================================================================
// Crawler over a fixed site
// ============================================================================

/// Serves fixed responses and records every path it renders
#[derive(Default)]
struct FixedSite {
    pages: HashMap<String, Response>,
    rendered: Mutex<Vec<String>>,
}

impl FixedSite {
    fn page(mut self, path: &str, html: &str) -> Self {
        let response = Response::text(200, html).with_header("content-type", "text/html");
        self.pages.insert(path.to_string(), response);
        self
    }

    fn response(mut self, path: &str, response: Response) -> Self {
        self.pages.insert(path.to_string(), response);
        self
    }

    fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageRenderer for FixedSite {
    async fn render(&self, path: &str) -> Option<Response> {
        self.rendered.lock().unwrap().push(path.to_string());
        self.pages.get(path).cloned()
    }
}

fn read(root: &Path, file: &str) -> String {
    fs::read_to_string(root.join(file)).unwrap()
}

#[tokio::test]
async fn test_cycle_visits_each_page_once() {
    let out = tempfile::tempdir().unwrap();
    let site = FixedSite::default()
        .page("/a", r#"<a href="/b">B</a>"#)
        .page("/b", r#"<a href="/a">A</a><a href="c">C</a>"#)
        .page("/c", r#"<a href="/a">A</a><a href="/b/index.html">B</a>"#);

    let crawler = Crawler::new(site, FsWriter::new(out.path()));
    let report = crawler.crawl(vec!["/a".to_string()]).await.unwrap();

    assert_eq!(crawler.renderer().rendered(), vec!["/a", "/b", "/c"]);
    assert_eq!(report.written, vec!["/a", "/b", "/c"]);
    assert!(report.is_success());

    assert_eq!(read(out.path(), "a/index.html"), r#"<a href="/b">B</a>"#);
    assert!(out.path().join("c/index.html").is_file());
}

#[tokio::test]
async fn test_depth_first_pre_order() {
    let out = tempfile::tempdir().unwrap();
    let site = FixedSite::default()
        .page("/", r#"<a href="/one">1</a><a href="/two">2</a>"#)
        .page("/one", r#"<a href="/one/deep">deep</a>"#)
        .page("/one/deep", "")
        .page("/two", "");

    let crawler = Crawler::new(site, FsWriter::new(out.path()));
    crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(crawler.renderer().rendered(), vec!["/", "/one", "/one/deep", "/two"]);
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let out = tempfile::tempdir().unwrap();
    let site = FixedSite::default()
        .page("/", r#"<a href="/old">Old</a>"#)
        .response("/old", Response::redirect(301, "/new page"));

    let crawler = Crawler::new(site, FsWriter::new(out.path()));
    let report = crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(report.redirected, vec!["/old"]);
    assert_eq!(crawler.renderer().rendered(), vec!["/", "/old"]);
    assert_eq!(
        read(out.path(), "old/index.html"),
        r#"<meta http-equiv="refresh" content="0;url=/new%20page">"#
    );
}

#[tokio::test]
async fn test_failures_are_reported_and_crawl_continues() {
    let out = tempfile::tempdir().unwrap();
    let site = FixedSite::default()
        .page("/", r#"<a href="/broken">x</a><a href="/fine">y</a>"#)
        .response(
            "/broken",
            Response::text(500, "<p>oops</p>").with_header("content-type", "text/html"),
        )
        .page("/fine", "");

    let crawler = Crawler::new(site, FsWriter::new(out.path()));
    let report = crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(report.failed, vec!["/broken"]);
    assert_eq!(report.written, vec!["/", "/fine"]);
    assert!(!out.path().join("broken/index.html").exists());
}

#[tokio::test]
async fn test_dependencies_are_written_but_not_scanned() {
    let out = tempfile::tempdir().unwrap();

    let mut page = Response::text(200, "<p>feed</p>").with_header("content-type", "text/html");
    page.dependencies.insert(
        "/feed.json".to_string(),
        Response::text(200, r#"{"link":"<a href=\"/secret\">"}"#)
            .with_header("content-type", "application/json"));

    let site = FixedSite::default().response("/feed", page);
    let crawler = Crawler::new(site, FsWriter::new(out.path()));
    let report = crawler.crawl(vec!["/feed".to_string()]).await.unwrap();

    assert_eq!(report.written, vec!["/feed", "/feed.json"]);
    assert_eq!(crawler.renderer().rendered(), vec!["/feed"]);
    assert!(read(out.path(), "feed.json").contains("/secret"));
}

#[tokio::test]
async fn test_static_files_and_queries() {
    let out = tempfile::tempdir().unwrap();
    let static_dir = tempfile::tempdir().unwrap();
    fs::write(static_dir.path().join("logo.png"), b"png").unwrap();

    let site = FixedSite::default()
        .page(
            "/",
            r#"<img src="/logo.png"><a href="/list?page=2">next</a><a href="https://example.com">x</a>"#,
        )
        .page("/list", "");

    let crawler = Crawler::new(site, FsWriter::new(out.path())).with_options(CrawlOptions {
        static_dir: Some(static_dir.path().to_path_buf()),
        ..CrawlOptions::default()
    });
    crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(crawler.renderer().rendered(), vec!["/", "/list"]);
}

#[tokio::test]
async fn test_crawling_disabled() {
    let out = tempfile::tempdir().unwrap();
    let site = FixedSite::default().page("/", r#"<a href="/about">About</a>"#);

    let crawler = Crawler::new(site, FsWriter::new(out.path())).with_options(CrawlOptions {
        crawl: false,
        ..CrawlOptions::default()
    });
    crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(crawler.renderer().rendered(), vec!["/"]);
}

#[tokio::test]
async fn test_encoded_separators_cannot_escape_the_output() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("nest/out");

    let mut page = Response::text(200, r#"<a href="/x%2F..%2F..%2Fescaped">x</a>"#)
        .with_header("content-type", "text/html");
    page.dependencies.insert(
        "/data%2F..%2F..%2Fleak.json".to_string(),
        Response::text(200, "{}").with_header("content-type", "application/json"),
    );

    let site = FixedSite::default()
        .response("/", page)
        .page("/x%2F..%2F..%2Fescaped", "<p>escaped</p>");

    let crawler = Crawler::new(site, FsWriter::new(&out));
    let report = crawler.crawl(vec!["/".to_string()]).await.unwrap();

    assert_eq!(report.written, vec!["/"]);
    assert_eq!(
        report.failed,
        vec!["/data%2F..%2F..%2Fleak.json", "/x%2F..%2F..%2Fescaped"]
    );
    assert!(!root.path().join("nest/escaped").exists());
    assert!(!root.path().join("nest/leak.json").exists());
}

// ============================================================================
// End to end through an App
// ============================================================================

fn touch(root: &Path, file: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

fn linked_page(html: &'static str) -> anyhow::Result<ComponentModule> {
    Ok(ComponentModule::from_fn(move |_, _, _| Ok(Rendered::html(html))).with_prerender(true))
}

async fn load_post(input: LoadInput) -> anyhow::Result<Option<Loaded>> {
    let slug = input.page.params["slug"].clone();
    let post: Value = input.fetch.get(&format!("/blog/{}.json", slug)).await?.json()?;
    Ok(Some(Loaded::props(post)))
}

async fn get_post(input: EndpointInput, _context: Value) -> anyhow::Result<EndpointResponse> {
    Ok(EndpointResponse::json(json!({ "title": input.params["slug"].to_uppercase() })))
}

#[tokio::test]
async fn test_prerender_app() {
    let root = tempfile::tempdir().unwrap();
    for file in [
        "src/routes/index.rsx",
        "src/routes/about.rsx",
        "src/routes/blog/[slug].rsx",
        "src/routes/blog/[slug].json.rs",
        "static/logo.png",
    ] {
        touch(root.path(), file);
    }

    let registry = ModuleRegistry::new()
        .with_component("src/routes/index.rsx", || {
            linked_page(r#"<img src="/logo.png"><a href="/about">About</a><a href="/blog/first">First</a>"#)
        })
        .with_component("src/routes/about.rsx", || linked_page(r#"<a href="/">Home</a>"#))
        .with_component("src/routes/blog/[slug].rsx", || {
            Ok(ComponentModule::from_fn(|props, _, _| {
                Ok(Rendered::html(format!("<h1>{}</h1>", props["title"].as_str().unwrap_or_default())))
            })
            .with_load_fn(load_post)
            .with_prerender(true))
        })
        .with_endpoint("src/routes/blog/[slug].json.rs", || Ok(EndpointModule::new().get(get_post)));

    let config = Config::default();
    let app = App::from_config(&config, root.path(), Arc::new(registry))
        .unwrap()
        .build();

    let report = prerender(&app, &config, root.path()).await.unwrap();

    assert_eq!(report.written, vec!["/about", "/", "/blog/first", "/blog/first.json"]);
    assert!(report.is_success());

    let build = root.path().join("build");
    assert!(read(&build, "index.html").contains(r#"<a href="/about">About</a>"#));
    assert!(read(&build, "blog/first/index.html").contains("<h1>FIRST</h1>"));
    assert_eq!(read(&build, "blog/first.json"), r#"{"title":"FIRST"}"#);
    assert!(!build.join("logo.png").exists());

    let writer = FsWriter::new(&build);
    write_server_manifest(&app, &writer).await.unwrap();
    let manifest: Value = serde_json::from_str(&read(&build, "manifest.json")).unwrap();
    assert_eq!(manifest["pages"].as_array().map(Vec::len), Some(3));
}
