//! Static export errors

use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop an export
///
/// Pages that render with an error status are not failures of the export;
/// they are logged and listed in the crawl report.
#[derive(Debug, Error)]
pub enum PrerenderError {
    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list routes in {}", dir.display())]
    Routes {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Refusing to write outside the output directory: {0}")]
    UnsafePath(String),

    #[error("Failed to serialize server manifest")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PrerenderError>;
