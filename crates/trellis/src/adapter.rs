// File: src/adapter.rs
// Purpose: Serves an App over HTTP with axum

use anyhow::{Context, Result};
use axum::body::Body as AxumBody;
use axum::extract::{Request as AxumRequest, State};
use axum::handler::Handler;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Router;
use tower_http::services::ServeDir;
use tower_livereload::LiveReloadLayer;
use tracing::{info, warn};
use trellis_router::Query;

use crate::app::App;
use crate::config::Config;
use crate::hot_reload::{create_watcher, DevReloader};
use crate::request::Request;
use crate::response::{Body, Response};

/// Router serving client files, static assets, then rendered routes
///
/// Client build output is mounted under `/{app_dir}`; requests for files in
/// the assets directory are served from disk, everything else goes to the
/// renderer.
pub fn router(app: App, config: &Config) -> Router {
    let client = ServeDir::new(&config.build.client_dir);
    let assets = ServeDir::new(&config.files.assets)
        .call_fallback_on_method_not_allowed(true)
        .fallback(handle.with_state(app));

    Router::new()
        .nest_service(&format!("/{}", config.build.app_dir), client)
        .fallback_service(assets)
}

async fn handle(State(app): State<App>, request: AxumRequest) -> AxumResponse {
    let request = match into_request(request).await {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected request: {:#}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    match app.render(&request).await {
        Some(response) => into_response(response),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Converts an axum request, reading the whole body
pub async fn into_request(request: AxumRequest) -> Result<Request> {
    let (parts, body) = request.into_parts();

    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .context("Failed to read request body")?;

    let mut converted = Request::new(parts.method.as_str(), parts.uri.path())
        .with_query(Query::parse(parts.uri.query().unwrap_or_default()));

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            converted = converted.with_header(name.as_str(), value);
        }
    }

    converted.host = converted
        .header("host")
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));

    Ok(converted.with_raw_body(&bytes))
}

/// Converts a rendered response, dropping its dependencies
pub fn into_response(response: Response) -> AxumResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match response.body {
        Some(Body::Text(text)) => AxumBody::from(text),
        Some(Body::Binary(bytes)) => AxumBody::from(bytes),
        None => AxumBody::empty(),
    };

    let mut converted = AxumResponse::new(body);
    *converted.status_mut() = status;

    let headers = converted.headers_mut();
    for (key, value) in &response.headers {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, val);
        }
    }

    converted
}

/// Serves `app` until the process exits
///
/// In dev mode with hot reload on, file changes rebuild the manifest and
/// reload connected browsers.
pub async fn start(app: App, config: &Config) -> Result<()> {
    let mut service = router(app.clone(), config);

    if config.render.dev && config.dev.hot_reload {
        let livereload = LiveReloadLayer::new();
        let reloader = DevReloader::new(app, config.manifest_config("."))
            .with_reloader(livereload.reloader());

        match create_watcher(config) {
            Ok(watcher) => {
                tokio::spawn(reloader.run(watcher));
                info!("Hot reload: enabled");
            }
            Err(e) => warn!("Failed to create file watcher: {}", e),
        }

        service = service.layer(livereload);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server running at http://{}", addr);
    axum::serve(listener, service)
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    #[tokio::test]
    async fn test_into_request() {
        let http = HttpRequest::builder()
            .method("POST")
            .uri("/api/items?tag=a&tag=b")
            .header("Host", "example.com")
            .header("Content-Type", "application/json")
            .body(AxumBody::from(r#"{"name":"x"}"#))
            .unwrap();

        let request = into_request(http).await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/items");
        assert_eq!(request.host.as_deref(), Some("example.com"));
        assert_eq!(request.query.get_all("tag"), vec!["a", "b"]);
        assert_eq!(request.body["name"], "x");
    }

    #[test]
    fn test_into_response_drops_dependencies() {
        let mut response = Response::text(201, "created").with_header("x-id", "7");
        response
            .dependencies
            .insert("/api".into(), Response::text(200, "dep"));

        let converted = into_response(response);
        assert_eq!(converted.status(), StatusCode::CREATED);
        assert_eq!(converted.headers()["x-id"], "7");
    }
}
