//! Sync session state
//!
//! Plain state machine behind the sync loop. All transitions happen under one
//! lock, and the message store lives inside that same state, so a fetch result
//! can only be written after checking that the cycle it belongs to is still
//! live.

use serde::Serialize;

use crate::error::SyncError;
use crate::store::MessageStore;

/// Lifecycle of the sync loop
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No timer, results are discarded
    Stopped,
    /// Started, first fetch of the cycle not yet completed
    Starting,
    /// First fetch completed, polling on the interval
    Running,
}

/// Result of asking for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new fetch was launched
    Started,
    /// A fetch is already outstanding; its result will serve this request
    Coalesced,
    /// The loop is stopped
    NotRunning,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) status: SyncStatus,
    /// Incremented on every start; identifies the current cycle
    pub(crate) generation: u64,
    /// Cycle of the one outstanding fetch, if any. There is a single slot
    /// across cycles: a fetch left over from a stopped cycle still holds it.
    pub(crate) in_flight: Option<u64>,
    /// A live request coalesced into a stale fetch and still needs its own
    pub(crate) owed: bool,
    pub(crate) loading: bool,
    pub(crate) store: MessageStore,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            status: SyncStatus::Stopped,
            generation: 0,
            in_flight: None,
            owed: false,
            loading: false,
            store: MessageStore::new(),
        }
    }

    /// Enter `Starting` and open a new cycle
    pub(crate) fn begin(&mut self) -> Result<u64, SyncError> {
        if self.status != SyncStatus::Stopped {
            return Err(SyncError::AlreadyRunning);
        }
        self.generation += 1;
        self.status = SyncStatus::Starting;
        self.owed = false;
        self.loading = true;
        Ok(self.generation)
    }

    /// Enter `Stopped`; returns false if already stopped
    pub(crate) fn end(&mut self) -> bool {
        if self.status == SyncStatus::Stopped {
            return false;
        }
        self.status = SyncStatus::Stopped;
        self.owed = false;
        self.loading = false;
        true
    }

    pub(crate) fn is_live(&self, generation: u64) -> bool {
        generation == self.generation && self.status != SyncStatus::Stopped
    }

    /// Claim the in-flight slot for a fetch in `generation`
    pub(crate) fn try_launch(&mut self, generation: u64) -> RefreshOutcome {
        if !self.is_live(generation) {
            return RefreshOutcome::NotRunning;
        }
        match self.in_flight {
            Some(owner) => {
                if owner != generation {
                    self.owed = true;
                }
                RefreshOutcome::Coalesced
            }
            None => {
                self.in_flight = Some(generation);
                RefreshOutcome::Started
            }
        }
    }

    /// Release the in-flight slot; returns whether the result may be applied
    pub(crate) fn finish(&mut self, generation: u64) -> bool {
        self.in_flight = None;
        if !self.is_live(generation) {
            return false;
        }
        self.loading = false;
        true
    }

    /// Cycle that is owed a fetch because its request coalesced into a
    /// stale one, if the loop is still running
    pub(crate) fn take_owed(&mut self) -> Option<u64> {
        let owed = std::mem::take(&mut self.owed);
        (owed && self.status != SyncStatus::Stopped).then_some(self.generation)
    }

    /// `Starting` -> `Running`; returns whether the transition happened
    pub(crate) fn mark_running(&mut self) -> bool {
        if self.status == SyncStatus::Starting {
            self.status = SyncStatus::Running;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }
}
