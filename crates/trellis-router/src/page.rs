//! Page descriptors shared by the server renderer and the client router

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::route::Params;

/// Parsed query string
///
/// Keeps every value of repeated keys in order, plus the raw string so a
/// redirect can reproduce the query verbatim.
///
/// # Examples
///
/// ```
/// use trellis_router::Query;
///
/// let query = Query::parse("tag=a&tag=b&page=2");
/// assert_eq!(query.get("page"), Some("2"));
/// assert_eq!(query.get_all("tag"), vec!["a", "b"]);
/// assert_eq!(query.as_str(), "tag=a&tag=b&page=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Self {
            raw: raw.to_string(),
            pairs,
        }
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Raw query string, without the leading `?`
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Serialized as a map of key to value list
impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !keys.contains(&k.as_str()) {
                keys.push(k);
            }
        }

        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            map.serialize_entry(key, &self.get_all(key))?;
        }
        map.end()
    }
}

/// The page being rendered or navigated to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    pub host: String,
    pub path: String,
    pub query: Query,
    pub params: Params,
}
