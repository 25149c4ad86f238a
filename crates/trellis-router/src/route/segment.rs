//! Segment grammar for file-based route names
//!
//! A segment is one path component of a route file name, e.g. `about`,
//! `[slug]`, `[id([0-9]+)].json` or `[...rest]`. Parsing is pure: the same
//! input always yields the same parts or the same error.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Result, RouteError};

/// One piece of a route segment
///
/// # Examples
///
/// ```
/// use trellis_router::route::{parse_segment, Part};
///
/// let segment = parse_segment("[id([0-9]+)].json").unwrap();
/// assert_eq!(
///     segment.parts(),
///     &[
///         Part::Param { name: "id".into(), qualifier: Some("[0-9]+".into()), rest: false },
///         Part::Literal(".json".into()),
///     ]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Literal text, matched exactly (after percent-encoding)
    Literal(String),
    /// A `[name]`, `[name(expr)]` or `[...name]` placeholder
    Param {
        name: String,
        /// Body of the validating expression, without the surrounding parens
        qualifier: Option<String>,
        rest: bool,
    },
}

impl Part {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Part::Param { .. })
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Part::Param { rest: true, .. })
    }

    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Part::Param { qualifier, .. } => qualifier.as_deref(),
            Part::Literal(_) => None,
        }
    }

    /// Literal text or parameter name
    pub fn content(&self) -> &str {
        match self {
            Part::Literal(text) => text,
            Part::Param { name, .. } => name,
        }
    }
}

/// Parsed grammar of a single path component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    parts: Vec<Part>,
}

impl Segment {
    /// Parses `text`, attributing errors to `route` (usually the source file)
    pub fn parse(text: &str, route: &str) -> Result<Self> {
        if text.contains("][") {
            return Err(RouteError::AdjacentParameters {
                route: route.to_string(),
            });
        }

        let mut parts = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find('[') {
            let Some(close) = find_close(&rest[open + 1..]) else {
                break;
            };

            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }

            let inner = &rest[open + 1..open + 1 + close];
            parts.push(parse_param(inner, route)?);
            rest = &rest[open + close + 2..];
        }

        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|part| !part.is_dynamic())
    }

    /// Appends a route suffix such as `.json` to this segment
    ///
    /// The suffix extends a trailing literal, or becomes a new literal part
    /// after a trailing parameter.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        match self.parts.last_mut() {
            Some(Part::Literal(text)) => text.push_str(suffix),
            _ => self.parts.push(Part::Literal(suffix.to_string())),
        }
        self
    }

    pub(crate) fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }
}

/// Parses a single path component
pub fn parse_segment(text: &str) -> Result<Segment> {
    Segment::parse(text, text)
}

/// Finds the `]` closing a parameter whose body starts at `body[0]`
///
/// A body holding a qualifier must end at the qualifier's closing paren, so
/// `]` characters inside the qualifier do not end the parameter early.
fn find_close(body: &str) -> Option<usize> {
    body.match_indices(']').map(|(i, _)| i).find(|&i| {
        let inner = &body[..i];
        i > 0 && (!inner.contains('(') || inner.ends_with(')'))
    })
}

fn parse_param(inner: &str, route: &str) -> Result<Part> {
    let (name, qualifier) = match inner.find('(') {
        Some(paren) if inner.ends_with(')') => {
            (&inner[..paren], Some(&inner[paren + 1..inner.len() - 1]))
        }
        _ => (inner, None),
    };

    if let Some(expr) = qualifier {
        if expr.is_empty() || expr.contains(['(', ')', '?', ':']) {
            return Err(RouteError::InvalidQualifier {
                route: route.to_string(),
            });
        }
    }

    let (name, rest) = match name.strip_prefix("...") {
        Some(name) => (name, true),
        None => (name, false),
    };

    if name.is_empty() || name.contains(['(', ')']) {
        return Err(RouteError::EmptyParameter {
            route: route.to_string(),
        });
    }

    Ok(Part::Param {
        name: name.to_string(),
        qualifier: qualifier.map(str::to_string),
        rest,
    })
}

/// Percent-encodes literal route text the way request paths arrive
///
/// Mirrors URI encoding of path text, additionally encoding `?` and `#`
/// while keeping square brackets readable.
pub fn encode_literal(text: &str) -> String {
    utf8_percent_encode(text, LITERAL).to_string()
}

/// Kept as-is in route literals besides ASCII alphanumerics
const LITERAL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'[')
    .remove(b']');

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literal(text: &str) -> Part {
        Part::Literal(text.to_string())
    }

    fn param(name: &str) -> Part {
        Part::Param {
            name: name.to_string(),
            qualifier: None,
            rest: false,
        }
    }

    #[test]
    fn test_parse_static() {
        let segment = parse_segment("about").unwrap();
        assert_eq!(segment.parts(), &[literal("about")]);
        assert!(segment.is_static());
    }

    #[test]
    fn test_parse_mixed() {
        let segment = parse_segment("post-[slug].html").unwrap();
        assert_eq!(
            segment.parts(),
            &[literal("post-"), param("slug"), literal(".html")]
        );
    }

    #[test]
    fn test_parse_rest() {
        let segment = parse_segment("[...path]").unwrap();
        assert_eq!(
            segment.parts(),
            &[Part::Param {
                name: "path".to_string(),
                qualifier: None,
                rest: true,
            }]
        );
    }

    #[test]
    fn test_parse_qualifier_with_brackets() {
        let segment = parse_segment("[id([0-9]+)]").unwrap();
        assert_eq!(segment.parts()[0].qualifier(), Some("[0-9]+"));
        assert_eq!(segment.parts()[0].content(), "id");
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        let segment = parse_segment("a[b").unwrap();
        assert_eq!(segment.parts(), &[literal("a[b")]);
    }

    #[test]
    fn test_adjacent_params_rejected() {
        let err = parse_segment("[a][b]").unwrap_err();
        assert!(matches!(err, RouteError::AdjacentParameters { .. }));
        assert!(err.to_string().contains("parameters must be separated"));
    }

    #[test]
    fn test_qualifier_characters_rejected() {
        for text in ["[a(x?y)]", "[a(x:y)]"] {
            let err = parse_segment(text).unwrap_err();
            assert!(matches!(err, RouteError::InvalidQualifier { .. }), "{text}");
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            parse_segment("[...]").unwrap_err(),
            RouteError::EmptyParameter { .. }
        ));
    }

    #[test]
    fn test_with_suffix() {
        let segment = parse_segment("blog").unwrap().with_suffix(".json");
        assert_eq!(segment.parts(), &[literal("blog.json")]);

        let segment = parse_segment("[slug]").unwrap().with_suffix(".json");
        assert_eq!(segment.parts(), &[param("slug"), literal(".json")]);
    }

    #[test]
    fn test_encode_literal() {
        assert_eq!(encode_literal("about"), "about");
        assert_eq!(encode_literal("a b"), "a%20b");
        assert_eq!(encode_literal("what?"), "what%3F");
        assert_eq!(encode_literal("#tag"), "%23tag");
        assert_eq!(encode_literal("café"), "caf%C3%A9");
    }
}
