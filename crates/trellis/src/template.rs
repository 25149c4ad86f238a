// File: src/template.rs
// Purpose: HTML document template wrapping every rendered page

use maud::{html, PreEscaped, DOCTYPE};
use std::path::Path;

use crate::error::RenderError;

const HEAD: &str = "%trellis.head%";
const BODY: &str = "%trellis.body%";

/// Document shell with `%trellis.head%` and `%trellis.body%` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Reads the template file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::Template {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(source))
    }

    /// Fills in the placeholders
    ///
    /// # Examples
    ///
    /// ```
    /// use trellis::Template;
    ///
    /// let template = Template::new("<head>%trellis.head%</head><body>%trellis.body%</body>");
    /// assert_eq!(
    ///     template.render("<title>Hi</title>", "<h1>Hi</h1>"),
    ///     "<head><title>Hi</title></head><body><h1>Hi</h1></body>"
    /// );
    /// ```
    pub fn render(&self, head: &str, body: &str) -> String {
        // The head marker precedes the inserted body
        self.source.replace(BODY, body).replacen(HEAD, head, 1)
    }
}

impl Default for Template {
    fn default() -> Self {
        let markup = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    (PreEscaped(HEAD))
                }
                body {
                    (PreEscaped(BODY))
                }
            }
        };
        Self::new(markup.into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_has_placeholders() {
        let template = Template::default();
        let html = template.render("<title>T</title>", "<p>B</p>");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>T</title>"));
        assert!(html.contains("<body><p>B</p></body>"));
    }

    #[test]
    fn test_load_missing_template() {
        let err = Template::load("does/not/exist.html").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.html"));
    }
}
