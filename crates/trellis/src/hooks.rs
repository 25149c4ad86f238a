// File: src/hooks.rs
// Purpose: Application hooks run around every request

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::request::Headers;

/// Output of [`Hooks::prepare`]
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// Request context passed to endpoints and to `get_session`
    pub context: Value,
    /// Headers merged into the final response
    pub headers: Headers,
}

impl Default for Prepared {
    fn default() -> Self {
        Self {
            context: Value::Object(Map::new()),
            headers: Headers::new(),
        }
    }
}

/// Per-request application hooks
#[async_trait]
pub trait Hooks: Send + Sync {
    async fn prepare(&self, _headers: &Headers) -> anyhow::Result<Prepared> {
        Ok(Prepared::default())
    }

    /// Session value exposed to load functions and serialized for hydration
    async fn get_session(&self, _context: &Value) -> anyhow::Result<Value> {
        Ok(Value::Object(Map::new()))
    }
}

/// Hooks that add nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

#[async_trait]
impl Hooks for DefaultHooks {}
