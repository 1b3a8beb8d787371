//! Error types
//!
//! Transport failures are classified once, at the transport boundary, into a
//! small taxonomy that the sync loop, the mutation coordinator and the error
//! sink all share.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad failure category, as reported to the error sink
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport-level failure, no response received
    Network,
    /// Non-success status or unusable payload from the server
    Server,
    /// Server rejected the request for lack of (valid) credentials
    AuthRequired,
    /// `start()` called on a loop that is already running
    AlreadyRunning,
    /// A send was attempted while another one is outstanding
    SendInProgress,
    /// A delete was attempted for an id that is already being deleted
    DeleteInProgress,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::SendInProgress => "send_in_progress",
            ErrorKind::DeleteInProgress => "delete_in_progress",
        };
        f.write_str(name)
    }
}

/// Errors returned by a [`Transport`](crate::transport::Transport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response: connection refused, DNS failure, timeout
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-success HTTP status with the server-supplied reason
    #[error("Server error ({status}): {reason}")]
    Server { status: u16, reason: String },

    /// 401/403 from the server
    #[error("Authentication required ({status}): {reason}")]
    AuthRequired { status: u16, reason: String },

    /// Success status, but the payload does not have the expected shape
    #[error("Malformed response from server: {details}")]
    Malformed { details: String },
}

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        TransportError::Network {
            message: message.into(),
        }
    }

    /// Create a malformed-payload error
    pub fn malformed(details: impl Into<String>) -> Self {
        TransportError::Malformed {
            details: details.into(),
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match status {
            401 | 403 => TransportError::AuthRequired { status, reason },
            _ => TransportError::Server { status, reason },
        }
    }

    /// The category reported to the error sink
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Network { .. } => ErrorKind::Network,
            TransportError::Server { .. } | TransportError::Malformed { .. } => ErrorKind::Server,
            TransportError::AuthRequired { .. } => ErrorKind::AuthRequired,
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Server { status, .. } | TransportError::AuthRequired { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether the server reported the target as not found
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Errors from the sync loop lifecycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync loop is already running")]
    AlreadyRunning,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::AlreadyRunning => ErrorKind::AlreadyRunning,
        }
    }
}

/// Errors from send and delete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Another send is still outstanding
    #[error("A message is already being sent")]
    SendInProgress,

    /// A delete for this id is still outstanding
    #[error("Message '{id}' is already being deleted")]
    DeleteInProgress { id: String },

    /// The server or network rejected the send
    #[error("Failed to send message: {source}")]
    SendFailed {
        #[source]
        source: TransportError,
    },

    /// The server or network rejected the delete
    #[error("Failed to delete message '{id}': {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: TransportError,
    },
}

impl MutationError {
    /// The category reported to the error sink
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::SendInProgress => ErrorKind::SendInProgress,
            MutationError::DeleteInProgress { .. } => ErrorKind::DeleteInProgress,
            MutationError::SendFailed { source } | MutationError::DeleteFailed { source, .. } => {
                source.kind()
            }
        }
    }

    /// The underlying transport failure, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            MutationError::SendFailed { source } | MutationError::DeleteFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Soft failures are reported but need no user action.
    ///
    /// A delete answered with "not found" means someone else already removed
    /// the message.
    pub fn is_soft(&self) -> bool {
        matches!(self, MutationError::DeleteFailed { source, .. } if source.is_not_found())
    }
}
