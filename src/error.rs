//! Errors surfaced by the service layer and their HTTP mapping.

use serde_json::Value;
use thiserror::Error;

use crate::params::QueryParams;
use crate::store::StoreError;

/// Result alias used by the service layer.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures surfaced to REST callers.
///
/// Every variant is terminal for the request: nothing is retried and no
/// partial result accompanies an error.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller attempted a mutation without the admin role.
    #[error("NOT AUTHORIZED!")]
    Forbidden {
        /// Role reported for the caller (empty when absent).
        role: String,
    },
    /// Request body could not be turned into statement parameters.
    #[error("Invalid JSON: {0}")]
    MalformedInput(String),
    /// The store executed the statement and reported errors.
    #[error("http 400 bad request")]
    StoreQuery {
        /// Query-string parameters of the failed request, echoed for diagnosis.
        params: QueryParams,
        /// Error records returned by the store.
        errors: Vec<Value>,
    },
    /// The store answered with a body that does not follow the columnar shape.
    #[error("malformed store response: {0}")]
    MalformedResponse(String),
    /// The store could not be reached or refused the request.
    #[error(transparent)]
    Transport(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Decode(source) => ServiceError::MalformedResponse(source.to_string()),
            other => ServiceError::Transport(other),
        }
    }
}

impl ServiceError {
    pub(crate) fn malformed_input(reason: impl Into<String>) -> Self {
        ServiceError::MalformedInput(reason.into())
    }

    pub(crate) fn malformed_response(reason: impl Into<String>) -> Self {
        ServiceError::MalformedResponse(reason.into())
    }

    /// HTTP status code the error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Forbidden { .. } => 403,
            ServiceError::MalformedInput(_) | ServiceError::StoreQuery { .. } => 400,
            ServiceError::MalformedResponse(_) | ServiceError::Transport(_) => 502,
        }
    }

    /// Machine-readable error name used in response bodies.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceError::Forbidden { .. } => "Forbidden",
            ServiceError::MalformedInput(_) | ServiceError::StoreQuery { .. } => "BadRequest",
            ServiceError::MalformedResponse(_) | ServiceError::Transport(_) => "BadGateway",
        }
    }

    /// Diagnostic payload attached to the error body.
    pub fn data(&self) -> Value {
        match self {
            ServiceError::Forbidden { role } => serde_json::json!({ "params": role }),
            ServiceError::MalformedInput(reason) => serde_json::json!({ "params": reason }),
            ServiceError::StoreQuery { params, errors } => {
                serde_json::json!({ "params": params, "errors": errors })
            }
            ServiceError::MalformedResponse(_) | ServiceError::Transport(_) => Value::Null,
        }
    }
}
