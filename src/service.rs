//! Typed function table for bound service objects.
//!
//! A `Service` pairs a declared type name with one handler closure per
//! exposed method. The router hands the selected handler back with the
//! dispatch decision, so nothing is looked up by name at request time.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("handler failed: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::InvalidInput(_) => 400,
            HandlerError::NotFound(_) => 404,
            HandlerError::Internal(_) => 500,
        }
    }
}

pub type HandlerResult = Result<Value, HandlerError>;

/// Everything a handler receives.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub arguments: Vec<Value>,
    pub identity: Option<String>,
    pub content_type: String,
}

impl Invocation {
    /// Argument at `index`, `Null` when absent.
    pub fn arg(&self, index: usize) -> &Value {
        self.arguments.get(index).unwrap_or(&Value::Null)
    }
}

/// Handler closure for one method.
pub type Handler = Arc<dyn Fn(&Invocation) -> HandlerResult + Send + Sync>;

/// A service object: a declared type plus its handlers.
#[derive(Clone)]
pub struct Service {
    type_name: String,
    handlers: HashMap<String, Handler>,
}

impl Service {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `method`.
    pub fn handler<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Invocation) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(f));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(method)
    }

    pub(crate) fn into_handlers(self) -> HashMap<String, Handler> {
        self.handlers
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.handlers.keys().collect();
        methods.sort();
        f.debug_struct("Service")
            .field("type_name", &self.type_name)
            .field("methods", &methods)
            .finish()
    }
}
