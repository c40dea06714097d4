//! The named-method dispatcher.
//!
//! A flat table of method name → async handler. Handlers take a JSON
//! params object and return a JSON result; validation problems and
//! internal failures come back as typed errors the transport maps onto
//! its error codes.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors a dispatched method can produce.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

type HandlerResult = Result<serde_json::Value, GatewayError>;
type Handler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The method table.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named method. Replaces any existing handler.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |params| Box::pin(handler(params))));
    }

    /// Invoke a method by name.
    pub async fn dispatch(&self, name: &str, params: serde_json::Value) -> HandlerResult {
        let Some(handler) = self.methods.get(name) else {
            return Err(GatewayError::MethodNotFound(name.to_string()));
        };
        debug!(method = name, "Dispatching gateway method");
        handler(params).await
    }

    /// All registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

// --- Param extraction helpers ---

/// A required string param.
pub fn require_str(params: &serde_json::Value, key: &str) -> Result<String, GatewayError> {
    params[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidParams(format!("missing string param '{key}'")))
}

/// An optional string param.
pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params[key].as_str().map(str::to_string)
}

/// An optional integer param with a default.
pub fn optional_i64(params: &serde_json::Value, key: &str, default: i64) -> i64 {
    params[key].as_i64().unwrap_or(default)
}

/// An optional unsigned param.
pub fn optional_u64(params: &serde_json::Value, key: &str) -> Option<u64> {
    params[key].as_u64()
}
