//! Mutation coordinator
//!
//! Runs send and delete against the transport and tracks what is in flight.
//! It never writes to the message store: after a successful mutation it asks
//! the sync loop for a refresh, and the next authoritative fetch brings the
//! change in.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::credentials::CredentialProvider;
use crate::error::MutationError;
use crate::events::{ErrorReport, EventSender, Operation};
use crate::sync::{RefreshOutcome, SyncHandle};
use crate::transport::Transport;

/// Something that can be asked for an immediate refresh
pub trait Refresh: Send + Sync {
    fn refresh_now(&self) -> RefreshOutcome;
}

impl Refresh for SyncHandle {
    fn refresh_now(&self) -> RefreshOutcome {
        SyncHandle::refresh_now(self)
    }
}

/// Transient state owned by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    /// A send is outstanding
    pub sending: bool,
    /// Ids with an outstanding delete
    pub pending_deletes: BTreeSet<String>,
    /// Unsent text; kept when a send fails
    pub draft: String,
}

/// Result of a send that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server accepted the message
    Sent,
    /// Blank text, nothing was sent
    Skipped,
}

/// Serializes sends and deletes against the transport
pub struct MutationCoordinator {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    refresher: Arc<dyn Refresh>,
    state: watch::Sender<MutationState>,
    events: EventSender,
}

impl MutationCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        refresher: Arc<dyn Refresh>,
        events: EventSender,
    ) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            transport,
            credentials,
            refresher,
            state,
            events,
        }
    }

    /// Replace the draft text
    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_if_modified(|state| {
            if state.draft == text {
                return false;
            }
            state.draft = text;
            true
        });
    }

    pub fn draft(&self) -> String {
        self.state.borrow().draft.clone()
    }

    /// Send the current draft
    pub async fn send_draft(&self) -> Result<SendOutcome, MutationError> {
        let draft = self.draft();
        self.send(&draft).await
    }

    /// Send a message
    ///
    /// Blank text is ignored. The text goes out untrimmed; the server owns
    /// trimming. On success the draft is cleared if it still holds this text
    /// and the sync loop is asked to refresh.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, MutationError> {
        if text.trim().is_empty() {
            debug!("ignoring blank message");
            return Ok(SendOutcome::Skipped);
        }

        let guard = self.claim_send()?;
        let credential = self.credentials.credential();
        debug!(len = text.len(), "sending message");

        match self.transport.send_message(credential.as_ref(), text).await {
            Ok(()) => {
                self.state.send_if_modified(|state| {
                    if state.draft != text {
                        return false;
                    }
                    state.draft.clear();
                    true
                });
                drop(guard);

                let outcome = self.refresher.refresh_now();
                info!(?outcome, "message sent");
                Ok(SendOutcome::Sent)
            }
            Err(source) => {
                let err = MutationError::SendFailed { source };
                self.events
                    .report(ErrorReport::from_mutation(Operation::SendMessage, &err));
                Err(err)
            }
        }
    }

    /// Delete a message by id
    ///
    /// The caller is responsible for authorization; the server has the final
    /// word. Nothing is removed locally. A "not found" answer is a soft
    /// failure and still triggers a refresh so the view converges.
    pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
        let guard = self.claim_delete(id)?;
        let credential = self.credentials.credential();
        debug!(id, "deleting message");

        let result = self.transport.delete_message(credential.as_ref(), id).await;
        drop(guard);

        match result {
            Ok(()) => {
                let outcome = self.refresher.refresh_now();
                info!(id, ?outcome, "message deleted");
                Ok(())
            }
            Err(source) => {
                let err = MutationError::DeleteFailed {
                    id: id.to_string(),
                    source,
                };
                if err.is_soft() {
                    self.refresher.refresh_now();
                }
                self.events
                    .report(ErrorReport::from_mutation(Operation::DeleteMessage, &err));
                Err(err)
            }
        }
    }

    pub fn is_sending(&self) -> bool {
        self.state.borrow().sending
    }

    pub fn is_deleting(&self, id: &str) -> bool {
        self.state.borrow().pending_deletes.contains(id)
    }

    /// Snapshot of the coordinator state
    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    fn claim_send(&self) -> Result<SendingGuard<'_>, MutationError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if state.sending {
                return false;
            }
            state.sending = true;
            claimed = true;
            true
        });

        if claimed {
            Ok(SendingGuard { state: &self.state })
        } else {
            Err(MutationError::SendInProgress)
        }
    }

    fn claim_delete(&self, id: &str) -> Result<DeleteGuard<'_>, MutationError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            claimed = state.pending_deletes.insert(id.to_string());
            claimed
        });

        if claimed {
            Ok(DeleteGuard {
                state: &self.state,
                id: id.to_string(),
            })
        } else {
            Err(MutationError::DeleteInProgress { id: id.to_string() })
        }
    }
}

/// Clears the sending flag however the send ends, including cancellation
struct SendingGuard<'a> {
    state: &'a watch::Sender<MutationState>,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.sending = false);
    }
}

struct DeleteGuard<'a> {
    state: &'a watch::Sender<MutationState>,
    id: String,
}

impl Drop for DeleteGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            state.pending_deletes.remove(&self.id);
        });
    }
}
