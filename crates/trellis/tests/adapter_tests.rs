use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body as AxumBody;
use axum::http::{Request as HttpRequest, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use trellis::adapter::router;
use trellis::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn write(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

async fn get_hello(input: EndpointInput, _context: Value) -> anyhow::Result<EndpointResponse> {
    Ok(EndpointResponse::json(json!({ "hello": input.query.get("name").unwrap_or("world") })))
}

fn project() -> (TempDir, Config, App) {
    let root = tempfile::tempdir().unwrap();
    write(root.path(), "src/routes/index.rsx", "");
    write(root.path(), "src/routes/api/hello.rs", "");
    write(root.path(), "static/robots.txt", "User-agent: *");
    write(root.path(), "client/start.js", "export function start() {}");

    let mut config = Config::default();
    config.files.assets = root.path().join("static").to_string_lossy().into_owned();
    config.build.client_dir = root.path().join("client").to_string_lossy().into_owned();

    let registry = ModuleRegistry::new()
        .with_component("src/routes/index.rsx", || {
            Ok(ComponentModule::from_fn(|_, _, _| Ok(Rendered::html("<h1>Home</h1>"))))
        })
        .with_endpoint("src/routes/api/hello.rs", || Ok(EndpointModule::new().get(get_hello)));

    let app = App::from_config(&config, root.path(), Arc::new(registry))
        .unwrap()
        .build();

    (root, config, app)
}

async fn send(config: &Config, app: &App, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let request = HttpRequest::builder()
        .uri(uri)
        .header("host", "localhost:3000")
        .body(AxumBody::empty())
        .unwrap();

    let response = router(app.clone(), config).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_serves_rendered_pages() {
    init_tracing();
    let (_root, config, app) = project();

    let (status, headers, body) = send(&config, &app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/html");
    assert!(headers.contains_key("etag"));
    assert!(body.contains("<h1>Home</h1>"));
}

#[tokio::test]
async fn test_serves_static_and_client_files() {
    init_tracing();
    let (_root, config, app) = project();

    let (status, _, body) = send(&config, &app, "/robots.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "User-agent: *");

    let (status, _, body) = send(&config, &app, "/_app/start.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("start()"));
}

#[tokio::test]
async fn test_serves_endpoints() {
    init_tracing();
    let (_root, config, app) = project();

    let (status, headers, body) = send(&config, &app, "/api/hello?name=trellis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body, r#"{"hello":"trellis"}"#);
}

#[tokio::test]
async fn test_unknown_paths_render_the_error_page() {
    init_tracing();
    let (_root, config, app) = project();

    let (status, _, body) = send(&config, &app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Not found: /nope"));
}

#[tokio::test]
async fn test_trailing_slash_redirect() {
    init_tracing();
    let (_root, config, app) = project();

    let (status, headers, _) = send(&config, &app, "/api/hello/?name=x").await;
    assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(headers["location"], "/api/hello?name=x");
}
