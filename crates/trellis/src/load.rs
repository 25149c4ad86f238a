// File: src/load.rs
// Purpose: Load functions run before a page level renders

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use trellis_router::Page;

use crate::error::PageError;
use crate::fetch::Fetcher;

/// Session value handed to load functions
///
/// Reading it marks the render as credential-sensitive, which makes any
/// cache-control header `private`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    value: Arc<Value>,
    used: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new(value: Arc<Value>, used: Arc<AtomicBool>) -> Self {
        Self { value, used }
    }

    pub fn get(&self) -> &Value {
        self.used.store(true, Ordering::Relaxed);
        &self.value
    }
}

/// Input of one level's load function
#[derive(Clone)]
pub struct LoadInput {
    pub page: Page,
    pub fetch: Fetcher,
    /// Merged `context` of every level loaded so far
    pub context: Map<String, Value>,
    pub(crate) session: SessionHandle,
}

impl LoadInput {
    pub fn session(&self) -> &Value {
        self.session.get()
    }
}

/// Result of a load function
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use trellis::Loaded;
///
/// let loaded = Loaded::props(json!({ "title": "Hello" }))
///     .with_context("user", json!("ada"))
///     .with_maxage(60);
/// assert_eq!(loaded.maxage, Some(60));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub props: Value,
    pub context: Map<String, Value>,
    pub maxage: Option<u32>,
    pub redirect: Option<String>,
    pub status: Option<u16>,
    pub error: Option<PageError>,
}

impl Loaded {
    pub fn props(props: Value) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            redirect: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            error: Some(PageError::new(status, message)),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_maxage(mut self, maxage: u32) -> Self {
        self.maxage = Some(maxage);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Resolves the result into what the renderer does next
    ///
    /// Errors win over redirects. A redirect with a non-3xx status and an
    /// error with a status outside 400..=599 both become 500 errors.
    pub fn normalize(self) -> LoadOutcome {
        if let Some(mut error) = self.error {
            let status = self
                .status
                .filter(|s| (400..=599).contains(s))
                .unwrap_or(500);
            error.status = status;
            return LoadOutcome::Error { status, error };
        }

        if let Some(location) = self.redirect {
            return match self.status {
                None => LoadOutcome::Redirect {
                    status: 302,
                    location,
                },
                Some(status) if (300..=399).contains(&status) => {
                    LoadOutcome::Redirect { status, location }
                }
                Some(_) => LoadOutcome::Error {
                    status: 500,
                    error: PageError::new(
                        500,
                        "\"redirect\" property returned from load() must be accompanied by a 3xx status code",
                    ),
                },
            };
        }

        let props = match self.props {
            Value::Null => Value::Object(Map::new()),
            props => props,
        };

        LoadOutcome::Props {
            props,
            context: self.context,
            maxage: self.maxage,
        }
    }
}

/// A normalized load result
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Error { status: u16, error: PageError },
    Redirect { status: u16, location: String },
    Props {
        props: Value,
        context: Map<String, Value>,
        maxage: Option<u32>,
    },
}

/// A page or layout's load function
///
/// Returning `Ok(None)` from the page's own load declines the request.
#[async_trait]
pub trait Load: Send + Sync {
    async fn load(&self, input: LoadInput) -> anyhow::Result<Option<Loaded>>;
}

/// Adapts an async closure into a [`Load`]
pub struct LoadFn<F>(pub F);

#[async_trait]
impl<F, Fut> Load for LoadFn<F>
where
    F: Fn(LoadInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Loaded>>> + Send + 'static,
{
    async fn load(&self, input: LoadInput) -> anyhow::Result<Option<Loaded>> {
        (self.0)(input).await
    }
}
