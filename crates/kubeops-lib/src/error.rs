//! Error taxonomy for cluster operations

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the reconciler, the health reporter and the cluster handle.
///
/// A "not found" answer from the API server is not an error for the
/// reconciler, which treats it as the create branch. It only surfaces as
/// [`Error::NotFound`] where the caller needs the object to exist.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("invalid quantity '{value}' for {field}: {reason}")]
    InvalidQuantity {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid port value '{value}'")]
    InvalidPort { value: String },

    #[error("invalid scaling policy: {0}")]
    InvalidPolicy(String),

    #[error("failed to {action}: {source}")]
    Api {
        action: String,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} {name} is in an unexpected state: {reason}")]
    UnexpectedState {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("failed to build Kubernetes client: {0}")]
    ClientConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a client error with the action that was being attempted
    pub fn api(action: impl Into<String>, source: kube::Error) -> Self {
        Error::Api {
            action: action.into(),
            source,
        }
    }

    /// True for malformed caller input, which is rejected before any API call
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidQuantity { .. } | Error::InvalidPort { .. } | Error::InvalidPolicy(_)
        )
    }

    /// True when the API server answered 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Api { source, .. } => is_not_found(source),
            _ => false,
        }
    }
}

/// Check whether a client error is the API server's 404 response
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
