//! KubeVirt client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum VirtError {
    /// Any other Kubernetes client or API error
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource with this name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl VirtError {
    /// Maps a kube error for `what`, turning 404 and 409 into their own variants
    pub fn from_kube(error: kube::Error, what: impl Into<String>) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 404 => VirtError::NotFound(what.into()),
            kube::Error::Api(response) if response.code == 409 => {
                VirtError::AlreadyExists(what.into())
            }
            _ => VirtError::Kube(error),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VirtError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, VirtError::AlreadyExists(_))
    }

    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            VirtError::Kube(kube::Error::Api(response)) => {
                response.code == 429 || response.code >= 500
            }
            VirtError::Kube(_) => true,
            VirtError::NotFound(_) | VirtError::AlreadyExists(_) => true,
            VirtError::Serialization(_) | VirtError::InvalidRequest(_) => false,
        }
    }
}

impl From<kube::Error> for VirtError {
    fn from(error: kube::Error) -> Self {
        VirtError::from_kube(error, "resource")
    }
}
