//! Controller-specific error types.
//!
//! This module defines error types specific to the VirtualMachineClone
//! controller that are not covered by upstream library errors.

use kube::Error as KubeError;
use thiserror::Error;
use virt_client::VirtError;

/// Errors that can occur in the VirtualMachineClone Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// KubeVirt client error
    #[error("KubeVirt API error: {0}")]
    Virt(#[from] VirtError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The clone request itself is invalid and cannot succeed
    #[error("Invalid clone request: {0}")]
    InvalidSpec(String),

    /// The target VM cannot be transformed as requested
    #[error("Transform failed: {0}")]
    Transform(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Health server I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether the reconcile should be retried with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Virt(e) => e.is_transient(),
            ControllerError::Kube(_) | ControllerError::Reconciliation(_) | ControllerError::Io(_) => true,
            ControllerError::InvalidSpec(_)
            | ControllerError::Transform(_)
            | ControllerError::InvalidConfig(_)
            | ControllerError::Serialization(_)
            | ControllerError::Metrics(_)
            | ControllerError::Watch(_) => false,
        }
    }
}
