//! Events emitted to the presentation layer
//!
//! One unbounded channel per session carries lifecycle changes, snapshot
//! notifications and every failure. Failures are structured reports rather
//! than strings so a front end can decide how loudly to show each one.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ErrorKind, MutationError, TransportError};
use crate::sync::SyncStatus;

/// Remote operation a failure belongs to
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    FetchMessages,
    SendMessage,
    DeleteMessage,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::FetchMessages => "fetch-messages",
            Operation::SendMessage => "send-message",
            Operation::DeleteMessage => "delete-message",
        };
        f.write_str(name)
    }
}

/// A failed fetch, send or delete
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub operation: Operation,
    pub kind: ErrorKind,
    pub message: String,
    /// Reported, but needs no user action
    pub soft: bool,
}

impl ErrorReport {
    pub fn from_transport(operation: Operation, error: &TransportError) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.to_string(),
            soft: false,
        }
    }

    pub fn from_mutation(operation: Operation, error: &MutationError) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.to_string(),
            soft: error.is_soft(),
        }
    }
}

/// Events emitted by a chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Sync loop lifecycle changed
    StatusChanged(SyncStatus),
    /// The message store was replaced with a new snapshot
    SnapshotReplaced { version: u64, count: usize },
    /// A fetch, send or delete failed
    Failure(ErrorReport),
}

/// Sending half of the session event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventSender {
    /// Create a sender and its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event; a dropped receiver is not an error
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }

    /// Log and emit a failure report
    pub fn report(&self, report: ErrorReport) {
        warn!(
            operation = %report.operation,
            kind = %report.kind,
            soft = report.soft,
            "{}",
            report.message
        );
        self.emit(ChatEvent::Failure(report));
    }
}
