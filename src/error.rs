//! Error types
//!
//! Transport, polling and reconciliation errors. Every reconciliation error
//! names the resource kind or ReconcilerID it concerns so callers can log
//! and retry at a higher layer.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single request/response exchange with a Google API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl TransportError {
    /// HTTP status code, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 409 (aborted) or 412 (condition not met) - the fingerprint was stale
    pub fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(409) | Some(412))
    }

    /// Worth polling again: rate limits, server errors and network failures
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// Short, user-facing explanation of the failure
    pub fn hint(&self) -> &'static str {
        match self.status() {
            Some(400) => "Invalid request. Check the resource fields.",
            Some(401) => "Authentication failed. Run 'gcloud auth application-default login'.",
            Some(403) => "Permission denied. Check your GCP IAM permissions.",
            Some(404) => "Resource not found.",
            Some(409) | Some(412) => "Resource changed concurrently. Read it again and retry.",
            Some(429) => "Rate limit exceeded. Please try again later.",
            Some(s) if s >= 500 => "GCP service temporarily unavailable. Please try again.",
            _ => "Request failed. Check your network connection and try again.",
        }
    }
}

/// Failure while waiting on an asynchronous operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("operation {operation} failed: {message}")]
    Failed { operation: String, message: String },

    #[error("operation {operation} did not finish within {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("polling operation {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("unrecognized operation response: {0}")]
    Malformed(String),
}

/// Reconciliation errors, one per lifecycle step
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("invalid {kind} configuration: {message}")]
    Validation { kind: &'static str, message: String },

    #[error("error creating {kind}: {source}")]
    Create {
        kind: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("error waiting to create {id}: {source}")]
    CreateWait {
        id: String,
        #[source]
        source: PollError,
    },

    #[error("error reading {id}: {source}")]
    Read {
        id: String,
        #[source]
        source: TransportError,
    },

    #[error("error decoding field {field} of {id}: {message}")]
    Decode {
        id: String,
        field: &'static str,
        message: String,
    },

    #[error("error updating {id}: {source}")]
    Update {
        id: String,
        #[source]
        source: TransportError,
    },

    #[error("error waiting to update {id}: {source}")]
    UpdateWait {
        id: String,
        #[source]
        source: PollError,
    },

    #[error("stale fingerprint updating {id}, read the resource and retry: {source}")]
    Conflict {
        id: String,
        #[source]
        source: TransportError,
    },

    #[error("field {field} of {id} cannot be updated in place, the resource must be replaced")]
    ForceNew { id: String, field: &'static str },

    #[error("error deleting {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: TransportError,
    },

    #[error("error waiting to delete {id}: {source}")]
    DeleteWait {
        id: String,
        #[source]
        source: PollError,
    },

    #[error("timed out after {timeout:?} while {operation} {id}; remote state is indeterminate")]
    Timeout {
        id: String,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("import id {import_id:?} does not match any {kind} format: {formats:?}")]
    ImportFormat {
        kind: &'static str,
        import_id: String,
        formats: Vec<String>,
    },
}

impl ReconcileError {
    /// The ReconcilerID this error concerns, if one was assigned
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::CreateWait { id, .. }
            | Self::Read { id, .. }
            | Self::Decode { id, .. }
            | Self::Update { id, .. }
            | Self::UpdateWait { id, .. }
            | Self::Conflict { id, .. }
            | Self::ForceNew { id, .. }
            | Self::Delete { id, .. }
            | Self::DeleteWait { id, .. }
            | Self::Timeout { id, .. } => Some(id),
            Self::Validation { .. } | Self::Create { .. } | Self::ImportFormat { .. } => None,
        }
    }

    /// The failed API exchange underneath, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Create { source, .. }
            | Self::Read { source, .. }
            | Self::Update { source, .. }
            | Self::Conflict { source, .. }
            | Self::Delete { source, .. } => Some(source),
            Self::CreateWait { source, .. }
            | Self::UpdateWait { source, .. }
            | Self::DeleteWait { source, .. } => match source {
                PollError::Transport { source, .. } => Some(source),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
