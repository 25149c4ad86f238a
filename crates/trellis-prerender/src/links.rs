// File: src/links.rs
// Purpose: Finds the site-local URLs a rendered page refers to

use once_cell::sync::Lazy;
use regex::Regex;
use trellis_router::path;

static CDATA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[.*?\]\]>").unwrap());

static SCRIPT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(<script.*?>).*?</script>").unwrap());

static STYLE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(<style.*?>).*?</style>").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(a|img|link|source)\s+(.+?)>").unwrap());

static HREF_REGEX: Lazy<Regex> = Lazy::new(|| attribute_regex("href"));
static SRC_REGEX: Lazy<Regex> = Lazy::new(|| attribute_regex("src"));
static SRCSET_REGEX: Lazy<Regex> = Lazy::new(|| attribute_regex("srcset"));

fn attribute_regex(name: &str) -> Regex {
    let pattern = format!(
        r#"(?s)(?:^|\s){}\s*=\s*(?:"(.*?)"|'(.*?)'|([^\s>]*))"#,
        name
    );
    Regex::new(&pattern).unwrap()
}

/// Removes CDATA sections, comments and the bodies of scripts and styles
pub fn clean_html(html: &str) -> String {
    let html = CDATA_REGEX.replace_all(html, "");
    let html = SCRIPT_REGEX.replace_all(&html, "$1</script>");
    let html = STYLE_REGEX.replace_all(&html, "$1</style>");
    COMMENT_REGEX.replace_all(&html, "").into_owned()
}

fn attribute<'a>(regex: &Regex, attrs: &'a str) -> Option<&'a str> {
    let captures = regex.captures(attrs)?;
    (1..=3)
        .filter_map(|i| captures.get(i))
        .map(|m| m.as_str())
        .find(|value| !value.is_empty())
}

/// URLs of a `srcset` value, without their width or density descriptors
fn srcset_urls(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

/// Every `href`, `src` and `srcset` URL of the linking elements, in
/// document order
///
/// `a` and `link` contribute `href`; `img` contributes `src` and `srcset`;
/// `source` contributes all three.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let cleaned = clean_html(html);
    let mut hrefs = Vec::new();

    for captures in TAG_REGEX.captures_iter(&cleaned) {
        let element = &captures[1];
        let attrs = &captures[2];

        if element != "img" {
            hrefs.extend(attribute(&HREF_REGEX, attrs).map(str::to_string));
        }

        if element == "img" || element == "source" {
            hrefs.extend(attribute(&SRC_REGEX, attrs).map(str::to_string));
            if let Some(srcset) = attribute(&SRCSET_REGEX, attrs) {
                hrefs.extend(srcset_urls(srcset).map(str::to_string));
            }
        }
    }

    hrefs
}

/// Resolves a reference found on the page at `from` to the path to crawl
///
/// External references yield `None`. The query string is dropped and a
/// trailing `index.html` is removed.
///
/// # Examples
///
/// ```
/// use trellis_prerender::links::crawl_target;
///
/// assert_eq!(crawl_target("/blog/post", "../about/index.html?x=1").as_deref(), Some("/about"));
/// assert_eq!(crawl_target("/", "https://example.com/"), None);
/// ```
pub fn crawl_target(from: &str, href: &str) -> Option<String> {
    let resolved = path::resolve(from, href)?;

    let mut parts: Vec<&str> = resolved.path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.last() == Some(&"index.html") {
        parts.pop();
    }

    Some(format!("/{}", parts.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_html() {
        let html = r#"<script type="module">const a = '<a href="/x">';</script><!-- <a href="/y"> --><style>a{}</style>"#;
        assert_eq!(
            clean_html(html),
            r#"<script type="module"></script><style></style>"#
        );
    }

    #[test]
    fn test_extract_hrefs() {
        let html = r#"
            <a class="nav" href="/about">About</a>
            <a href='/blog'>Blog</a>
            <a href=contact>Contact</a>
            <link rel="stylesheet" href="/style.css">
            <img src="/logo.png" srcset="/logo-2x.png 2x, /logo-3x.png 3x">
            <source src="/clip.webm" srcset="/small.webp 480w,/large.webp 1080w">
            <a data-href="/ignored">No href</a>
        "#;

        assert_eq!(
            extract_hrefs(html),
            vec![
                "/about",
                "/blog",
                "contact",
                "/style.css",
                "/logo.png",
                "/logo-2x.png",
                "/logo-3x.png",
                "/clip.webm",
                "/small.webp",
                "/large.webp",
            ]
        );
    }

    #[test]
    fn test_links_in_scripts_are_ignored() {
        let html = r#"<script>document.write('<a href="/hidden">')</script><a href="/shown">"#;
        assert_eq!(extract_hrefs(html), vec!["/shown"]);
    }

    #[test]
    fn test_crawl_target() {
        assert_eq!(crawl_target("/blog/post", "other").as_deref(), Some("/blog/other"));
        assert_eq!(crawl_target("/blog", "/index.html").as_deref(), Some("/"));
        assert_eq!(crawl_target("/", "/feed?page=2").as_deref(), Some("/feed"));
        assert_eq!(crawl_target("/", "//cdn.example.com/x.js"), None);
        assert_eq!(crawl_target("/", "mailto:a@example.com"), None);
    }
}
