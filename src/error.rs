//! Error types for the Manila CSI Driver Operator

use thiserror::Error;

use crate::adapters::openstack::CatalogError;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Serialization of a desired object failed
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A required key is absent from a secret
    #[error("Secret {secret} did not contain key {key}")]
    MissingKey { secret: String, key: String },

    /// clouds.yaml could not be read or does not contain the expected cloud
    #[error("Cloud configuration error: {0}")]
    CloudConfigError(String),

    /// The backend share type catalog could not be listed
    #[error("Manila catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    /// An immutable object was deleted for replacement but could not be recreated
    #[error("{kind} {name} was deleted for replacement but could not be recreated: {source}")]
    ReplaceIncomplete {
        kind: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// Several independent syncs failed
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<Error>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Collapse a list of per-entry errors into a single result
    pub fn aggregate(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }

    /// Whether retrying the same pass soon has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            Error::KubeError(_) | Error::CatalogError(_) => true,
            Error::ReplaceIncomplete { .. } => true,
            Error::Aggregate(errors) => errors.iter().all(Error::is_transient),
            _ => false,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("[{}]", messages.join(", "))
}
