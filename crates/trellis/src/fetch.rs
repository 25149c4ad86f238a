// File: src/fetch.rs
// Purpose: The fetch function handed to load functions

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use trellis_router::path::{self, Resolved};
use trellis_router::Query;

use crate::app::{App, RenderState};
use crate::error::FetchError;
use crate::hydrate::DataBlock;
use crate::request::{Headers, Request};
use crate::response::{status_text, Response};

/// Whether credentials of the incoming request are forwarded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

/// Options of a single fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub method: String,
    pub headers: Headers,
    pub body: Option<String>,
    pub credentials: Credentials,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Headers::new(),
            body: None,
            credentials: Credentials::default(),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON body with a matching content type
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// A fetched response with its body already read
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    body: Vec<u8>,
}

impl FetchedResponse {
    fn from_response(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            status_text: response.status_text().to_string(),
            headers: response.headers.clone(),
            body: response
                .body
                .as_ref()
                .map(|b| b.as_bytes().to_vec())
                .unwrap_or_default(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Result<&str, FetchError> {
        std::str::from_utf8(&self.body).map_err(|_| FetchError::Utf8 {
            url: self.url.clone(),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|source| FetchError::Json {
            url: self.url.clone(),
            source,
        })
    }
}

/// State shared by every fetch of one page render
#[derive(Debug, Default)]
pub(crate) struct FetchState {
    dependencies: Mutex<BTreeMap<String, Response>>,
    blocks: Mutex<Vec<DataBlock>>,
    pub(crate) uses_credentials: Arc<AtomicBool>,
}

impl FetchState {
    pub(crate) fn new(uses_credentials: Arc<AtomicBool>) -> Self {
        Self {
            uses_credentials,
            ..Self::default()
        }
    }

    pub(crate) async fn take_dependencies(&self) -> BTreeMap<String, Response> {
        std::mem::take(&mut *self.dependencies.lock().await)
    }

    pub(crate) async fn take_blocks(&self) -> Vec<DataBlock> {
        std::mem::take(&mut *self.blocks.lock().await)
    }
}

/// `fetch` as seen by load functions
///
/// Relative URLs resolve against the page being rendered. Static assets are
/// read from disk when rendering locally, other routes of the app are
/// rendered in-process and recorded as dependencies of the page, and
/// anything else goes over the network.
#[derive(Clone)]
pub struct Fetcher {
    app: App,
    request: Request,
    state: RenderState,
    shared: Arc<FetchState>,
    hydrate: bool,
}

impl Fetcher {
    pub(crate) fn new(
        app: App,
        request: Request,
        state: RenderState,
        shared: Arc<FetchState>,
        hydrate: bool,
    ) -> Self {
        Self {
            app,
            request,
            state,
            shared,
            hydrate,
        }
    }

    /// `GET` with default options
    pub async fn get(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        self.fetch(url, FetchOptions::default()).await
    }

    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<FetchedResponse, FetchError> {
        let render = self.app.options();

        let mut url = url;
        if render.local && !render.paths.assets.is_empty() {
            if let Some(rest) = url.strip_prefix(render.paths.assets.as_str()) {
                url = rest;
            }
        }

        let response = match path::resolve(&self.request.path, url) {
            Some(resolved) => self.fetch_local(url, resolved, options).await?,
            None => self.fetch_external(url, options).await?,
        };

        if self.hydrate {
            if let Ok(body) = response.text() {
                let block = DataBlock::new(
                    url,
                    response.status,
                    response.status_text.clone(),
                    &response.headers,
                    body,
                );
                self.shared.blocks.lock().await.push(block);
            }
        }

        Ok(response)
    }

    fn host(&self) -> String {
        self.request
            .host
            .clone()
            .or_else(|| self.app.options().host.clone())
            .unwrap_or_else(|| "localhost".to_string())
    }

    async fn fetch_local(
        &self,
        url: &str,
        resolved: Resolved,
        options: FetchOptions,
    ) -> Result<FetchedResponse, FetchError> {
        let render = self.app.options();
        let manifest = self.app.manifest().await;

        if let Some(asset) = manifest.asset_for(&resolved.path) {
            return match render.static_dir.as_ref().filter(|_| render.local) {
                Some(dir) => {
                    let body = tokio::fs::read(dir.join(&asset.file)).await.map_err(|source| {
                        FetchError::StaticFile {
                            file: asset.file.clone(),
                            source,
                        }
                    })?;

                    let mut headers = Headers::new();
                    if let Some(mime) = &asset.mime {
                        headers.insert("content-type".to_string(), mime.clone());
                    }

                    Ok(FetchedResponse {
                        url: url.to_string(),
                        status: 200,
                        status_text: status_text(200).to_string(),
                        headers,
                        body,
                    })
                }
                None => {
                    let target = format!("http://{}/{}", self.host(), asset.file);
                    self.fetch_external(&target, options).await
                }
            };
        }

        let route_path = match resolved.path.as_str() {
            "/" => "/",
            path => path.trim_end_matches('/'),
        };
        if manifest.resolve(route_path).is_none() {
            debug!("Internal fetch {} matched nothing", resolved.path);
            return Ok(FetchedResponse::from_response(url, &Response::text(404, "Not found")));
        }

        let mut headers: Headers = options
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        if options.credentials != Credentials::Omit {
            self.shared.uses_credentials.store(true, Ordering::Relaxed);

            if let Some(cookie) = self.request.header("cookie") {
                headers.insert("cookie".to_string(), cookie.to_string());
            }
            if !headers.contains_key("authorization") {
                if let Some(authorization) = self.request.header("authorization") {
                    headers.insert("authorization".to_string(), authorization.to_string());
                }
            }
        }

        let mut nested = Request::new(options.method.to_ascii_uppercase(), resolved.path.clone())
            .with_query(Query::parse(resolved.query.as_deref().unwrap_or_default()));
        nested.host = self.request.host.clone();
        nested.headers = headers;
        if let Some(body) = &options.body {
            nested = nested.with_raw_body(body.as_bytes());
        }

        let state = RenderState {
            fetched: Some(url.to_string()),
            initiators: self.state.initiators.clone(),
        };

        debug!("Internal fetch {} from {}", resolved.path, self.request.path);

        let response = match self.app.ssr(nested, state).await {
            Some(rendered) => {
                self.shared
                    .dependencies
                    .lock()
                    .await
                    .insert(resolved.path.clone(), rendered.clone());
                rendered
            }
            None => Response::text(404, "Not found"),
        };

        Ok(FetchedResponse::from_response(url, &response))
    }

    async fn fetch_external(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<FetchedResponse, FetchError> {
        let target = match url.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => url.to_string(),
        };

        let method = reqwest::Method::from_bytes(options.method.to_ascii_uppercase().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut request = self.app.http().request(method, &target);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if let Some(body) = options.body {
            request = request.body(body);
        }

        let network = |source| FetchError::Network {
            url: target.clone(),
            source,
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(network)?.to_vec();

        Ok(FetchedResponse {
            url: url.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetched_response_body() {
        let response = Response::text(200, r#"{"ok":true}"#).with_header("Content-Type", "application/json");
        let fetched = FetchedResponse::from_response("/api", &response);

        assert!(fetched.ok());
        assert_eq!(fetched.status_text, "OK");
        assert_eq!(fetched.header("content-type"), Some("application/json"));
        assert_eq!(fetched.json::<serde_json::Value>().unwrap(), json!({"ok": true}));
        assert_eq!(fetched.text().unwrap(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_fetched_response_bad_json() {
        let fetched = FetchedResponse::from_response("/x", &Response::text(200, "nope"));
        let err = fetched.json::<serde_json::Value>().unwrap_err();
        assert!(err.to_string().contains("/x"));
    }

    #[test]
    fn test_fetch_options() {
        let options = FetchOptions::new()
            .with_method("POST")
            .with_json(&json!({"a": 1}))
            .with_credentials(Credentials::Omit);
        assert_eq!(options.headers["content-type"], "application/json");
        assert_eq!(options.body.as_deref(), Some(r#"{"a":1}"#));
    }
}
