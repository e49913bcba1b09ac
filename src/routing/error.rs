//! Routing error definitions.

use thiserror::Error;

/// Errors raised while binding services or dispatching requests.
///
/// `TypeIntrospection` and `InvalidBindingDeclaration` are bind-time errors
/// and should abort startup; the rest are per-request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No known resource, or request data that cannot be bound to arguments.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The path matched but no binding supports the verb.
    #[error("Method {method} not allowed, expected one of: {}", .allowed.join(", "))]
    MethodNotAllowed { method: String, allowed: Vec<String> },

    /// No binding can produce an acceptable representation.
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// The type is unknown or cannot be inspected.
    #[error("Type introspection failed: {0}")]
    TypeIntrospection(String),

    /// Malformed declaration metadata, or a duplicate binding.
    #[error("Invalid binding declaration: {0}")]
    InvalidBindingDeclaration(String),
}

impl RouteError {
    /// HTTP status code the invoking layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            RouteError::BadRequest(_) => 400,
            RouteError::MethodNotAllowed { .. } => 405,
            RouteError::NotAcceptable(_) => 406,
            RouteError::TypeIntrospection(_) | RouteError::InvalidBindingDeclaration(_) => 500,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::BadRequest(_) => "bad_request",
            RouteError::MethodNotAllowed { .. } => "method_not_allowed",
            RouteError::NotAcceptable(_) => "not_acceptable",
            RouteError::TypeIntrospection(_) => "type_introspection",
            RouteError::InvalidBindingDeclaration(_) => "invalid_binding",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RouteError::InvalidBindingDeclaration(msg.into())
    }
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
