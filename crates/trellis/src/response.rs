// File: src/response.rs
// Purpose: Framework-level response produced by the renderer

use axum::http::StatusCode;
use std::collections::BTreeMap;

use crate::request::Headers;

/// Response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(bytes)
    }
}

/// A rendered response
///
/// `dependencies` holds the responses of internal fetches made while
/// rendering, keyed by resolved path. The HTTP adapter drops them; the
/// prerenderer writes them to disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Option<Body>,
    pub dependencies: BTreeMap<String, Response>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Plain response with a body and no headers
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status).with_body(Body::Text(body.into()))
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self::new(status).with_header("location", location)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body as text, empty when absent
    pub fn text_body(&self) -> &str {
        self.body.as_ref().and_then(Body::as_text).unwrap_or("")
    }

    /// Reason phrase for the status, empty for unknown codes
    pub fn status_text(&self) -> &'static str {
        status_text(self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

pub(crate) fn status_text(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(Response::new(404).status_text(), "Not Found");
        assert_eq!(Response::new(200).status_text(), "OK");
        assert_eq!(Response::new(599).status_text(), "");
    }

    #[test]
    fn test_redirect_carries_only_location() {
        let response = Response::redirect(302, "/login");
        assert_eq!(response.header("Location"), Some("/login"));
        assert_eq!(response.headers.len(), 1);
        assert!(response.body.is_none());
        assert!(response.is_redirect());
    }

    #[test]
    fn test_binary_body_as_text() {
        let body = Body::Binary(vec![0xff, 0xfe]);
        assert_eq!(body.as_text(), None);
        assert_eq!(body.len(), 2);
    }
}
