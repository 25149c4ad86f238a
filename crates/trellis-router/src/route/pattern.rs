/// Compiled route patterns
///
/// A `CompiledPattern` is a list of per-segment matchers built from parsed
/// [`Segment`]s. Static segments compare exactly, dynamic segments use a small
/// anchored regex, and rest segments consume any number of whole path
/// segments (non-greedily, backtracking when later segments fail).
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use regex::Regex;

use super::segment::{encode_literal, Part, Segment};
use crate::error::{Result, RouteError};

/// Extracted route parameters, ordered by name
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone)]
enum SegmentMatcher {
    Static(String),
    Dynamic { regex: Regex, names: Vec<String> },
    Rest { name: String },
}

/// Matcher compiled from a route's segment chain
///
/// # Examples
///
/// ```
/// use trellis_router::route::compile;
///
/// let pattern = compile("blog/[slug]").unwrap();
/// assert!(pattern.matches("/blog/hello-world"));
/// assert!(pattern.matches("/blog/hello-world/"));
///
/// let params = pattern.exec("/blog/hello-world").unwrap();
/// assert_eq!(params["slug"], "hello-world");
/// ```
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    segments: Vec<Segment>,
    matchers: Vec<SegmentMatcher>,
    param_names: Vec<String>,
    param_types: Vec<Option<String>>,
    trailing_slash: bool,
    source: String,
}

/// Compiles a slash-separated route string such as `blog/[slug].json`
///
/// Tolerates a single trailing slash on matched paths, the way page routes
/// do.
pub fn compile(route: &str) -> Result<CompiledPattern> {
    let segments = route
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| Segment::parse(s, route))
        .collect::<Result<Vec<_>>>()?;

    CompiledPattern::new(segments, true, route)
}

impl CompiledPattern {
    /// Builds a matcher from parsed segments
    ///
    /// `route` names the origin of the segments in error messages.
    pub fn new(segments: Vec<Segment>, trailing_slash: bool, route: &str) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut param_names = Vec::new();
        let mut param_types = Vec::new();

        for part in segments.iter().flat_map(|s| s.parts()) {
            if let Part::Param {
                name, qualifier, ..
            } = part
            {
                if !seen.insert(name.as_str()) {
                    return Err(RouteError::DuplicateParameter {
                        route: route.to_string(),
                        name: name.clone(),
                    });
                }
                param_names.push(name.clone());
                param_types.push(qualifier.clone());
            }
        }

        let matchers = segments
            .iter()
            .map(|segment| build_matcher(segment, route))
            .collect::<Result<Vec<_>>>()?;

        let source = render_source(&segments, trailing_slash);

        Ok(Self {
            segments,
            matchers,
            param_names,
            param_types,
            trailing_slash,
            source,
        })
    }

    /// Checks whether `path` matches without extracting parameters
    pub fn matches(&self, path: &str) -> bool {
        self.exec(path).is_some()
    }

    /// Matches `path` and extracts its decoded parameters
    pub fn exec(&self, path: &str) -> Option<Params> {
        let path = path.strip_prefix('/')?;
        let path = match path.strip_suffix('/') {
            Some(stripped) if self.trailing_slash && !self.matchers.is_empty() => stripped,
            _ => path,
        };

        let components: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };

        let mut captures = Vec::new();
        if !match_from(&self.matchers, &components, &mut captures) {
            return None;
        }

        Some(
            captures
                .into_iter()
                .map(|(name, raw)| {
                    let value = urlencoding::decode(&raw)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or(raw);
                    (name, value)
                })
                .collect(),
        )
    }

    /// Parameter names in declaration order
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Qualifier expression of each parameter, aligned with `param_names`
    pub fn param_types(&self) -> &[Option<String>] {
        &self.param_types
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_params(&self) -> bool {
        !self.param_names.is_empty()
    }

    /// Canonical regular-expression text of this pattern
    ///
    /// Two routes clash exactly when their sources are equal. The text is
    /// also valid JavaScript regex syntax, so it is emitted verbatim into
    /// the client manifest.
    pub fn regex_source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CompiledPattern {}

fn build_matcher(segment: &Segment, route: &str) -> Result<SegmentMatcher> {
    let parts = segment.parts();

    if let Some(Part::Param { name, .. }) = parts.iter().find(|p| p.is_rest()) {
        if parts.len() > 1 {
            return Err(RouteError::RestNotWholeSegment {
                route: route.to_string(),
                name: name.clone(),
            });
        }
        return Ok(SegmentMatcher::Rest { name: name.clone() });
    }

    if segment.is_static() {
        let text: String = parts.iter().map(Part::content).collect();
        return Ok(SegmentMatcher::Static(encode_literal(&text)));
    }

    let mut expr = String::from("^");
    let mut names = Vec::new();
    for part in parts {
        match part {
            Part::Literal(text) => expr.push_str(&regex::escape(&encode_literal(text))),
            Part::Param {
                name, qualifier, ..
            } => {
                expr.push('(');
                expr.push_str(qualifier.as_deref().unwrap_or("[^/]+?"));
                expr.push(')');
                names.push(name.clone());
            }
        }
    }
    expr.push('$');

    let regex = Regex::new(&expr).map_err(|source| RouteError::BadQualifier {
        route: route.to_string(),
        qualifier: parts
            .iter()
            .filter_map(Part::qualifier)
            .collect::<Vec<_>>()
            .join(", "),
        source,
    })?;

    Ok(SegmentMatcher::Dynamic { regex, names })
}

/// Backtracking matcher over path components
///
/// Rest segments try the shortest span first, so later segments get the
/// first chance to match.
fn match_from(
    matchers: &[SegmentMatcher],
    components: &[&str],
    captures: &mut Vec<(String, String)>,
) -> bool {
    let Some((matcher, remaining)) = matchers.split_first() else {
        return components.is_empty();
    };

    match matcher {
        SegmentMatcher::Static(text) => match components.split_first() {
            Some((first, rest)) if first == text => match_from(remaining, rest, captures),
            _ => false,
        },
        SegmentMatcher::Dynamic { regex, names } => {
            let Some((first, rest)) = components.split_first() else {
                return false;
            };
            let Some(caps) = regex.captures(first) else {
                return false;
            };

            let mark = captures.len();
            for (i, name) in names.iter().enumerate() {
                let value = caps.get(i + 1).map_or("", |m| m.as_str());
                captures.push((name.clone(), value.to_string()));
            }

            if match_from(remaining, rest, captures) {
                true
            } else {
                captures.truncate(mark);
                false
            }
        }
        SegmentMatcher::Rest { name } => {
            let mark = captures.len();
            for take in 0..=components.len() {
                captures.push((name.clone(), components[..take].join("/")));
                if match_from(remaining, &components[take..], captures) {
                    return true;
                }
                captures.truncate(mark);
            }
            false
        }
    }
}

fn render_source(segments: &[Segment], trailing_slash: bool) -> String {
    if segments.is_empty() {
        return String::from("^\\/$");
    }

    let mut source = String::from("^");
    for segment in segments {
        let parts = segment.parts();
        if parts.len() == 1 && parts[0].is_rest() {
            source.push_str("(?:\\/(.*?))?");
            continue;
        }

        source.push_str("\\/");
        for part in parts {
            match part {
                Part::Literal(text) => {
                    source.push_str(&regex::escape(&encode_literal(text)).replace('/', "\\/"))
                }
                Part::Param { qualifier, .. } => {
                    source.push('(');
                    source.push_str(qualifier.as_deref().unwrap_or("[^/]+?"));
                    source.push(')');
                }
            }
        }
    }

    source.push_str(if trailing_slash { "\\/?$" } else { "$" });
    source
}
