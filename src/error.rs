//! Error types for the Windows Machine Config Operator
//!
//! Provides structured error types for every bootstrap stage: machine
//! lookup, user-data secret, CSR approval, node registration, CNI patching
//! and remote configuration of the Windows guest.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Error getting Machine {name}: {source}")]
    Machine {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Error creating windows user data secret {namespace}/{name}: {source}")]
    Secret {
        namespace: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Error getting cluster network object: {0}")]
    ClusterNetwork(String),

    // =========================================================================
    // Bootstrap Errors
    // =========================================================================
    #[error("Failed to configure Windows VM {instance_id}: {reason}")]
    RemoteConfiguration { instance_id: String, reason: String },

    #[error("CSR not found for requestor {requestor}")]
    CsrNotFound { requestor: String },

    #[error("Error approving CSR for {requestor}: {source}")]
    CsrApproval {
        requestor: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Unable to find node for instance {instance_id}")]
    NodeNotFound { instance_id: String },

    #[error("Error updating node object {node}: {source}")]
    NodeUpdate {
        node: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Host subnet not assigned to node {node}")]
    HostSubnetUnavailable { node: String },

    #[error("Signer error: {0}")]
    Signer(String),

    // =========================================================================
    // Network Configuration Errors
    // =========================================================================
    #[error("Invalid CIDR {value}: {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("Error opening CNI config file from {path}: {source}")]
    CniRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't decode CNI config JSON from {path}: {source}")]
    CniDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Can't encode CNI config JSON for {path}: {source}")]
    CniEncode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Can't write CNI config file to {path}: {source}")]
    CniWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CNI config {path} has no usable {policy_type} policy")]
    CniPolicyMissing { path: String, policy_type: String },

    // =========================================================================
    // Cloud Infrastructure Errors
    // =========================================================================
    #[error("Cloud infrastructure error: {provider} - {reason}")]
    CloudInfrastructure { provider: String, reason: String },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_) | Error::Machine { .. } | Error::Secret { .. } => {
                ErrorAction::RequeueWithBackoff
            }

            // Wrapped errors inherit the action of their cause
            Error::CsrApproval { source, .. } | Error::NodeUpdate { source, .. } => {
                source.action()
            }

            // Fatal bootstrap failures - let the next reconcile try again later
            Error::RemoteConfiguration { .. }
            | Error::CsrNotFound { .. }
            | Error::NodeNotFound { .. }
            | Error::HostSubnetUnavailable { .. }
            | Error::CniRead { .. }
            | Error::CniWrite { .. } => ErrorAction::RequeueAfter(Duration::from_secs(60)),

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_)
            | Error::Cancelled(_)
            | Error::Signer(_)
            | Error::InvalidCidr { .. }
            | Error::CniDecode { .. }
            | Error::CniEncode { .. }
            | Error::CniPolicyMissing { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(_) => true,
            Error::Machine { source, .. }
            | Error::Secret { source, .. }
            | Error::CsrApproval { source, .. }
            | Error::NodeUpdate { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Check if this error is an API "not found" response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this error is an API "already exists" response
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "AlreadyExists"
        )
    }

    /// Check if this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Kube(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "Conflict"
        )
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".into(),
        message: format!("{} ({})", reason, code),
        reason: reason.into(),
        code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::CsrNotFound {
            requestor: "system:node:".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(60))
        );

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::CniPolicyMissing {
            path: "/payload/cni/cni-conf-template.json".into(),
            policy_type: "ROUTE".into(),
        };
        assert_eq!(err.action(), ErrorAction::NoRequeue);
    }

    #[test]
    fn test_wrapped_errors_inherit_action() {
        let err = Error::CsrApproval {
            requestor: "system:node:".into(),
            source: Box::new(api_error(500, "InternalError")),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_retryable() {
        let transient = api_error(503, "ServiceUnavailable");
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
        assert!(!config_err.is_transient());
    }

    #[test]
    fn test_api_status_classification() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(api_error(409, "AlreadyExists").is_already_exists());
        assert!(api_error(409, "Conflict").is_conflict());
        assert!(!api_error(409, "Conflict").is_already_exists());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = Error::CsrNotFound {
            requestor: "system:node:".into(),
        };
        assert_eq!(err.to_string(), "CSR not found for requestor system:node:");

        let err = Error::NodeNotFound {
            instance_id: "i-078285fdadccb2eaa".into(),
        };
        assert!(err.to_string().contains("i-078285fdadccb2eaa"));
    }
}
