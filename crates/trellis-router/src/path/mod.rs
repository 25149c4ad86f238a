/// URL path helpers shared by the renderer, crawler and client router
///
/// All functions are pure: given the same input they produce the same
/// output.
use std::borrow::Cow;

use url::Url;

/// Origin used to resolve relative references that stay on this site
const INTERNAL_ORIGIN: &str = "http://trellis.internal";

/// Checks whether a path is free of trailing slashes
///
/// # Examples
///
/// ```
/// use trellis_router::path::is_canonical;
///
/// assert!(is_canonical("/"));
/// assert!(is_canonical("/about"));
/// assert!(!is_canonical("/about/"));
/// assert!(!is_canonical(""));
/// ```
pub fn is_canonical(path: &str) -> bool {
    path.starts_with('/') && (path == "/" || !path.ends_with('/'))
}

/// Strips trailing slashes from a path, keeping the root as `/`
///
/// Returns `Cow::Borrowed` when the path is already canonical.
///
/// # Examples
///
/// ```
/// use std::borrow::Cow;
/// use trellis_router::path::canonical_path;
///
/// assert!(matches!(canonical_path("/about"), Cow::Borrowed("/about")));
/// assert_eq!(canonical_path("/about//"), "/about");
/// assert_eq!(canonical_path("///"), "/");
/// ```
pub fn canonical_path(path: &str) -> Cow<'_, str> {
    if is_canonical(path) {
        return Cow::Borrowed(path);
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Cow::Borrowed("/")
    } else if trimmed.starts_with('/') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("/{}", trimmed))
    }
}

/// A reference resolved against a site path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Percent-encoded absolute path
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
}

/// Resolves `href` relative to the page at `from`
///
/// Returns `None` for references that leave the site: absolute URLs with a
/// scheme, protocol-relative URLs and anything else that does not resolve to
/// a rooted path on the same origin. Fragments are dropped.
///
/// # Examples
///
/// ```
/// use trellis_router::path::resolve;
///
/// let resolved = resolve("/blog/post", "other?page=2").unwrap();
/// assert_eq!(resolved.path, "/blog/other");
/// assert_eq!(resolved.query.as_deref(), Some("page=2"));
///
/// assert!(resolve("/blog", "https://example.com/").is_none());
/// assert!(resolve("/blog", "//cdn.example.com/x.js").is_none());
/// ```
pub fn resolve(from: &str, href: &str) -> Option<Resolved> {
    let base = Url::parse(INTERNAL_ORIGIN).ok()?.join(from).ok()?;
    let url = base.join(href).ok()?;

    if url.origin() != base.origin() {
        return None;
    }

    Some(Resolved {
        path: url.path().to_string(),
        query: url.query().map(str::to_string),
    })
}

/// Whether `href` carries its own scheme, e.g. `https://` or `data:`
pub fn is_external(href: &str) -> bool {
    Url::parse(href).is_ok()
}

/// Removes a base prefix from a path, mapping an empty remainder to `/`
pub fn strip_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    match path.strip_prefix(base)? {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}
