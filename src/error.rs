//! Error types for the tenancy controllers

use std::time::Duration;

use thiserror::Error;

use crate::registry::ObjectKind;

/// Main error type for tenancy reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The API server reported that the object does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: ObjectKind,
        /// Name of the missing object
        name: String,
    },

    /// A create lost a race against another writer
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Kind of the object that already exists
        kind: ObjectKind,
        /// Name of the object that already exists
        name: String,
    },

    /// Any other Kubernetes API failure (network, conflict, throttling)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Required fields are malformed; retrying will not help
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A reconcile pass ran past its deadline
    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),

    /// Invariant violation inside the controller
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a Kubernetes API error for an object of the given kind.
    ///
    /// 404 becomes [`Error::NotFound`], 409 with reason `AlreadyExists`
    /// becomes [`Error::AlreadyExists`]; everything else is kept as-is.
    pub fn from_api(kind: ObjectKind, name: impl Into<String>, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound {
                kind,
                name: name.into(),
            },
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists {
                    kind,
                    name: name.into(),
                }
            }
            _ => Self::Kube(err),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the API reported the object missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a create collided with an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether the scheduler should requeue with backoff.
    ///
    /// Only malformed input is terminal; it waits for the object to change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
