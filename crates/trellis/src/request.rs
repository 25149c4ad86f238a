// File: src/request.rs
// Purpose: Framework-level request passed to the renderer

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;
use trellis_router::Query;

/// Header map with lowercase keys
pub type Headers = BTreeMap<String, String>;

/// Lowercases every key of a header map
pub fn lowercase_keys<I, K, V>(headers: I) -> Headers
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
        .collect()
}

/// An incoming request, independent of the HTTP server
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub host: Option<String>,
    pub method: String,
    pub headers: Headers,
    /// Percent-encoded path, always starting with `/`
    pub path: String,
    pub query: Query,
    /// Body as parsed by the adapter; opaque to the renderer
    pub body: Value,
    /// Set when `body` is a base64 string of binary content
    pub is_base64_encoded: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: None,
            method: method.into(),
            headers: Headers::new(),
            path: path.into(),
            query: Query::default(),
            body: Value::Null,
            is_base64_encoded: false,
        }
    }

    /// A `GET` request; `target` may carry a query string
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis::Request;
    ///
    /// let request = Request::get("/search?q=rust");
    /// assert_eq!(request.path, "/search");
    /// assert_eq!(request.query.get("q"), Some("rust"));
    /// ```
    pub fn get(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self::new("GET", path).with_query(Query::parse(query))
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sets `body` from raw bytes according to the content type
    pub fn with_raw_body(mut self, body: &[u8]) -> Self {
        let (value, is_base64_encoded) = parse_body(self.header("content-type"), body);
        self.body = value;
        self.is_base64_encoded = is_base64_encoded;
        self
    }
}

/// Parses a raw request body
///
/// JSON and form bodies become structured values and text becomes a string.
/// Anything else is base64-encoded, flagged by the returned boolean.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> (Value, bool) {
    if body.is_empty() {
        return (Value::Null, false);
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "application/json" => match serde_json::from_slice(body) {
            Ok(value) => (value, false),
            Err(_) => (Value::String(String::from_utf8_lossy(body).into_owned()), false),
        },
        "application/x-www-form-urlencoded" => {
            let mut fields = serde_json::Map::new();
            for (key, value) in url::form_urlencoded::parse(body) {
                fields.insert(key.into_owned(), Value::String(value.into_owned()));
            }
            (Value::Object(fields), false)
        }
        _ => match std::str::from_utf8(body) {
            Ok(text) if mime.is_empty() || mime.starts_with("text/") => {
                (Value::String(text.to_string()), false)
            }
            _ => (Value::String(BASE64.encode(body)), true),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = Request::get("/").with_header("If-None-Match", "\"abc\"");
        assert_eq!(request.header("if-none-match"), Some("\"abc\""));
        assert_eq!(request.header("IF-NONE-MATCH"), Some("\"abc\""));
    }

    #[test]
    fn test_lowercase_keys() {
        let headers = lowercase_keys([("Content-Type", "text/plain"), ("X-Custom", "1")]);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert!(headers.contains_key("x-custom"));
    }

    #[test]
    fn test_parse_body() {
        let (json, encoded) = parse_body(Some("application/json; charset=utf-8"), br#"{"a":1}"#);
        assert_eq!(json["a"], 1);
        assert!(!encoded);

        let (form, _) = parse_body(Some("application/x-www-form-urlencoded"), b"name=Ada+L&x=%2F");
        assert_eq!(form["name"], "Ada L");
        assert_eq!(form["x"], "/");

        let (text, _) = parse_body(Some("text/plain"), b"hello");
        assert_eq!(text, Value::String("hello".into()));

        let (binary, encoded) = parse_body(Some("application/octet-stream"), &[0, 159, 146]);
        assert_eq!(binary, Value::String("AJ+S".into()));
        assert!(encoded);

        assert_eq!(parse_body(None, b""), (Value::Null, false));
    }

    #[test]
    fn test_get_without_query() {
        let request = Request::get("/about");
        assert_eq!(request.method, "GET");
        assert!(request.query.is_empty());
    }
}
