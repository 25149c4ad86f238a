//! Rendering errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures looking up or instantiating route modules
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("No module registered for {0}")]
    NotFound(String),

    #[error("{0} is not a component module")]
    NotAComponent(String),

    #[error("{0} is not an endpoint module")]
    NotAnEndpoint(String),

    #[error("Failed to load {id}: {message}")]
    Load { id: String, message: String },
}

/// Failures of the internal `fetch` passed to load functions
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read static file {file}")]
    StaticFile {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Response body of {url} is not valid JSON")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response body of {url} is not valid UTF-8")]
    Utf8 { url: String },
}

/// Failures that abort a render outright
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Failed to read template {path}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error value shown by error pages and embedded for hydration
///
/// # Examples
///
/// ```
/// use trellis::PageError;
///
/// let error = PageError::new(404, "Not found: /missing");
/// assert_eq!(error.name, "Error");
/// assert_eq!(error.status, 404);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub status: u16,
    /// Extra structured data attached by the thrower
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PageError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            message: message.into(),
            stack: None,
            status,
            details: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Converts an `anyhow` error, keeping its full chain as the stack
    ///
    /// A `PageError` carried inside the error is returned as is, so a load
    /// function can fail with a specific status.
    pub fn from_anyhow(error: &anyhow::Error, status: u16) -> Self {
        if let Some(page_error) = error.downcast_ref::<PageError>() {
            return page_error.clone();
        }

        Self {
            name: "Error".to_string(),
            message: error.to_string(),
            stack: Some(format!("{:?}", error)),
            status,
            details: None,
        }
    }
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PageError {}
