//! Build-time routing errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while compiling route patterns or building a manifest
///
/// Every variant names the route (or file) that caused it, so a failed
/// build points straight at the offending source file.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route {route}: parameters must be separated")]
    AdjacentParameters { route: String },

    #[error("Invalid route {route}: cannot use (, ), ? or : in route qualifiers")]
    InvalidQualifier { route: String },

    #[error("Invalid route {route}: qualifier `{qualifier}` is not a valid pattern")]
    BadQualifier {
        route: String,
        qualifier: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid route {route}: duplicate parameter `{name}`")]
    DuplicateParameter { route: String, name: String },

    #[error("Invalid route {route}: parameter name cannot be empty")]
    EmptyParameter { route: String },

    #[error("Invalid route {route}: rest parameter `{name}` must be the only part of its segment")]
    RestNotWholeSegment { route: String, name: String },

    #[error("The {first} and {second} routes clash")]
    Clash { first: String, second: String },

    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid asset manifest {}", path.display())]
    AssetManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RouteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;
