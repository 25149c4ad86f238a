/// Specificity ordering between routes
///
/// Decides which of two routes that could match the same path is tried
/// first. Static beats dynamic, longer static text beats shorter, qualified
/// parameters beat unqualified ones and rest parameters sort last.
use std::cmp::Ordering;

use super::pattern::CompiledPattern;
use super::segment::Part;

/// Sort key for one directory entry of the routes tree
#[derive(Debug, Clone, Copy)]
pub struct SortKey<'a> {
    pub parts: &'a [Part],
    pub is_index: bool,
    /// Whether the entry's path contains a rest parameter
    pub is_spread: bool,
}

/// Orders two sibling entries of the routes tree
///
/// Index files sort before their siblings, unless the index lives under a
/// rest parameter, in which case it sorts after them.
pub fn compare_items(a: SortKey<'_>, b: SortKey<'_>) -> Ordering {
    if a.is_index != b.is_index {
        return match (a.is_index, a.is_spread, b.is_spread) {
            (true, true, _) => Ordering::Greater,
            (true, false, _) => Ordering::Less,
            (false, _, true) => Ordering::Less,
            (false, _, false) => Ordering::Greater,
        };
    }

    compare_parts(a.parts, b.parts, a.is_index)
}

/// Orders two part lists of the same path position
///
/// `a_is_index` breaks the tie between two rest parameters: the index one
/// goes later.
pub fn compare_parts(a: &[Part], b: &[Part], a_is_index: bool) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let (a_part, b_part) = match (a.get(i), b.get(i)) {
            (None, _) => return Ordering::Greater,
            (_, None) => return Ordering::Less,
            (Some(a), Some(b)) => (a, b),
        };

        if a_part.is_rest() && b_part.is_rest() {
            return if a_is_index {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        if a_part.is_rest() != b_part.is_rest() {
            return later_if(a_part.is_rest());
        }

        if a_part.is_dynamic() != b_part.is_dynamic() {
            return later_if(a_part.is_dynamic());
        }

        if !a_part.is_dynamic() && a_part.content() != b_part.content() {
            return b_part
                .content()
                .len()
                .cmp(&a_part.content().len())
                .then_with(|| a_part.content().cmp(b_part.content()));
        }

        if a_part.is_dynamic() {
            match (a_part.qualifier(), b_part.qualifier()) {
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (Some(qa), Some(qb)) if qa != qb => {
                    return qb.len().cmp(&qa.len()).then_with(|| qa.cmp(qb));
                }
                _ => {}
            }
        }
    }

    Ordering::Equal
}

/// Orders two compiled patterns segment by segment
///
/// When one pattern is a prefix of the other, the shorter one comes first.
///
/// # Examples
///
/// ```
/// use trellis_router::route::{compare_patterns, compile};
///
/// let mut routes = vec![
///     compile("a/[...rest]").unwrap(),
///     compile("a/[b]").unwrap(),
///     compile("a/static").unwrap(),
/// ];
/// routes.sort_by(compare_patterns);
///
/// let order: Vec<_> = routes.iter().map(|r| r.regex_source()).collect();
/// assert_eq!(order[0], compile("a/static").unwrap().regex_source());
/// assert_eq!(order[2], compile("a/[...rest]").unwrap().regex_source());
/// ```
pub fn compare_patterns(a: &CompiledPattern, b: &CompiledPattern) -> Ordering {
    let (a_segments, b_segments) = (a.segments(), b.segments());

    for i in 0..a_segments.len().max(b_segments.len()) {
        let (a_seg, b_seg) = match (a_segments.get(i), b_segments.get(i)) {
            (None, _) => return Ordering::Less,
            (_, None) => return Ordering::Greater,
            (Some(a), Some(b)) => (a, b),
        };

        match compare_parts(a_seg.parts(), b_seg.parts(), false) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

fn later_if(condition: bool) -> Ordering {
    if condition {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::parse_segment;

    fn key<'a>(parts: &'a [Part], is_index: bool, is_spread: bool) -> SortKey<'a> {
        SortKey {
            parts,
            is_index,
            is_spread,
        }
    }

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut segments: Vec<_> = names
            .iter()
            .map(|n| (n.to_string(), parse_segment(n).unwrap()))
            .collect();
        segments.sort_by(|(_, a), (_, b)| compare_parts(a.parts(), b.parts(), false));
        segments.into_iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn test_static_before_dynamic_before_rest() {
        assert_eq!(
            sorted(&["[...rest]", "[slug]", "about"]),
            vec!["about", "[slug]", "[...rest]"]
        );
    }

    #[test]
    fn test_longer_static_first() {
        assert_eq!(
            sorted(&["b", "about", "abc", "a"]),
            vec!["about", "abc", "a", "b"]
        );
    }

    #[test]
    fn test_qualified_before_unqualified() {
        assert_eq!(
            sorted(&["[id]", "[id([0-9])]", "[id([0-9]+)]"]),
            vec!["[id([0-9]+)]", "[id([0-9])]", "[id]"]
        );
    }

    #[test]
    fn test_mixed_segment_before_plain_param() {
        assert_eq!(
            sorted(&["[slug]", "[slug].json"]),
            vec!["[slug].json", "[slug]"]
        );
    }

    #[test]
    fn test_index_ordering() {
        let index = parse_segment("index").unwrap();
        let about = parse_segment("about").unwrap();

        assert_eq!(
            compare_items(key(index.parts(), true, false), key(about.parts(), false, false)),
            Ordering::Less
        );
        assert_eq!(
            compare_items(key(index.parts(), true, true), key(about.parts(), false, false)),
            Ordering::Greater
        );
        assert_eq!(
            compare_items(key(about.parts(), false, false), key(index.parts(), true, true)),
            Ordering::Less
        );
    }

    #[test]
    fn test_spread_index_sorts_later() {
        let rest = parse_segment("[...rest]").unwrap();

        assert_eq!(
            compare_items(key(rest.parts(), true, true), key(rest.parts(), true, true)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_patterns_prefix_first() {
        let short = crate::route::compile("a").unwrap();
        let long = crate::route::compile("a/b").unwrap();

        assert_eq!(compare_patterns(&short, &long), Ordering::Less);
        assert_eq!(compare_patterns(&long, &short), Ordering::Greater);
    }
}
