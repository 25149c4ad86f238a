// File: src/hydrate.rs
// Purpose: Serialized state embedded in rendered pages for client hydration

use maud::{html, PreEscaped};
use serde::Serialize;
use serde_json::{json, Value};
use trellis_router::Page;

use crate::app::Paths;
use crate::error::PageError;
use crate::request::Headers;

/// JSON that can be placed inside a `<script>` element
///
/// # Examples
///
/// ```
/// use trellis::hydrate::script_safe_json;
///
/// let json = script_safe_json(&"</script>").unwrap();
/// assert_eq!(json, r#""\u003C\u002Fscript\u003E""#);
/// ```
pub fn script_safe_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    Ok(escape_for_script(&json))
}

fn escape_for_script(json: &str) -> String {
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => escaped.push_str("\\u003C"),
            '>' => escaped.push_str("\\u003E"),
            '/' => escaped.push_str("\\u002F"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Error snapshot for hydration
///
/// Falls back to name, message and stack only, then to an empty object, so
/// the page is always produced.
pub fn serialize_error(error: Option<&PageError>) -> String {
    let Some(error) = error else {
        return "null".to_string();
    };

    script_safe_json(error)
        .or_else(|_| {
            script_safe_json(&json!({
                "name": error.name,
                "message": error.message,
                "stack": error.stack,
            }))
        })
        .unwrap_or_else(|_| "{}".to_string())
}

/// A fetched response embedded so the client does not request it again
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataBlock {
    #[serde(skip)]
    pub url: String,
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub headers: Headers,
    pub body: String,
}

impl DataBlock {
    /// `etag` and `set-cookie` are never embedded
    pub fn new(
        url: impl Into<String>,
        status: u16,
        status_text: impl Into<String>,
        headers: &Headers,
        body: impl Into<String>,
    ) -> Self {
        let headers = headers
            .iter()
            .filter(|(k, _)| k.as_str() != "etag" && k.as_str() != "set-cookie")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            url: url.into(),
            status,
            status_text: status_text.into(),
            headers,
            body: body.into(),
        }
    }

    pub fn to_script(&self) -> String {
        let payload = script_safe_json(self).unwrap_or_else(|_| "{}".to_string());
        let markup = html! {
            script type="trellis-data" url=(self.url) { (PreEscaped(payload)) }
        };
        markup.into_string()
    }
}

/// The `hydrate` block of the start script
#[derive(Debug)]
pub struct HydrateBlock<'a> {
    pub status: u16,
    pub error: Option<&'a PageError>,
    /// Module URLs of every component in the chain
    pub nodes: Vec<String>,
    pub page: &'a Page,
}

/// Module script booting the client runtime
#[derive(Debug)]
pub struct StartScript<'a> {
    pub entry: String,
    pub target: Option<&'a str>,
    pub paths: &'a Paths,
    pub session: &'a Value,
    pub host: Option<&'a str>,
    pub route: bool,
    pub spa: bool,
    pub hydrate: Option<HydrateBlock<'a>>,
}

fn js_string(value: &str) -> String {
    script_safe_json(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl StartScript<'_> {
    pub fn render(&self) -> String {
        let target = match self.target {
            Some(selector) => format!(
                "document.querySelector({}) || document.body",
                js_string(selector)
            ),
            None => "document.body".to_string(),
        };

        let host = match self.host {
            Some(host) => js_string(host),
            None => "location.host".to_string(),
        };

        let hydrate = match &self.hydrate {
            Some(block) => {
                let nodes = block
                    .nodes
                    .iter()
                    .map(|node| format!("import({})", js_string(node)))
                    .collect::<Vec<_>>()
                    .join(", ");

                format!(
                    "{{\n\t\t\tstatus: {},\n\t\t\terror: {},\n\t\t\tnodes: [{}],\n\t\t\tpage: {{\n\t\t\t\thost: {},\n\t\t\t\tpath: {},\n\t\t\t\tquery: new URLSearchParams({}),\n\t\t\t\tparams: {}\n\t\t\t}}\n\t\t}}",
                    block.status,
                    serialize_error(block.error),
                    nodes,
                    js_string(&block.page.host),
                    js_string(&block.page.path),
                    js_string(block.page.query.as_str()),
                    script_safe_json(&block.page.params).unwrap_or_else(|_| "{}".to_string()),
                )
            }
            None => "null".to_string(),
        };

        let paths = script_safe_json(self.paths).unwrap_or_else(|_| "{}".to_string());
        let session = script_safe_json(self.session).unwrap_or_else(|_| "{}".to_string());

        format!(
            "<script type=\"module\">\n\timport {{ start }} from {};\n\tstart({{\n\t\ttarget: {},\n\t\tpaths: {},\n\t\tsession: {},\n\t\thost: {},\n\t\troute: {},\n\t\tspa: {},\n\t\thydrate: {}\n\t}});\n</script>",
            js_string(&self.entry),
            target,
            paths,
            session,
            host,
            self.route,
            self.spa,
            hydrate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_router::Query;

    #[test]
    fn test_script_safe_json_escapes_terminators() {
        let json = script_safe_json(&json!({ "html": "<b>x</b>\u{2028}" })).unwrap();
        assert!(!json.contains('<'));
        assert!(!json.contains("</"));
        assert!(json.contains("\\u2028"));

        // Still valid JSON
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["html"], "<b>x</b>\u{2028}");
    }

    #[test]
    fn test_serialize_error() {
        assert_eq!(serialize_error(None), "null");

        let error = PageError::new(404, "Not found: /x");
        let parsed: Value = serde_json::from_str(&serialize_error(Some(&error))).unwrap();
        assert_eq!(parsed["status"], 404);
        assert_eq!(parsed["message"], "Not found: /x");
    }

    #[test]
    fn test_data_block_drops_sensitive_headers() {
        let headers: Headers = [
            ("content-type", "application/json"),
            ("etag", "\"abc\""),
            ("set-cookie", "a=b"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let block = DataBlock::new("/api/data?x=\"1\"", 200, "OK", &headers, "{\"a\":1}");
        assert_eq!(block.headers.len(), 1);

        let script = block.to_script();
        assert!(script.starts_with("<script type=\"trellis-data\" url=\"/api/data?x=&quot;1&quot;\">"));
        assert!(script.contains("\"statusText\":\"OK\""));
        assert!(script.ends_with("</script>"));
    }

    #[test]
    fn test_start_script() {
        let page = Page {
            host: "example.com".into(),
            path: "/blog/hi".into(),
            query: Query::parse("a=1"),
            params: [("slug".to_string(), "hi".to_string())].into_iter().collect(),
        };
        let paths = Paths::default();
        let session = json!({});

        let script = StartScript {
            entry: "/_app/start.js".into(),
            target: Some("#app"),
            paths: &paths,
            session: &session,
            host: None,
            route: true,
            spa: false,
            hydrate: Some(HydrateBlock {
                status: 200,
                error: None,
                nodes: vec!["/_app/layout.js".into()],
                page: &page,
            }),
        }
        .render();

        assert!(script.contains("import { start } from \"\\u002F_app\\u002Fstart.js\";"));
        assert!(script.contains("document.querySelector(\"#app\") || document.body"));
        assert!(script.contains("host: location.host"));
        assert!(script.contains("query: new URLSearchParams(\"a=1\")"));
        assert!(script.contains("params: {\"slug\":\"hi\"}"));
        assert!(script.contains("error: null"));
    }
}
