//! Feed synchronization
//!
//! Keeps the local message store in step with the chat service by polling.
//!
//! ## Guarantees
//!
//! 1. A successful fetch replaces the whole store; a failed one leaves it
//!    untouched and is reported on the event channel
//! 2. At most one fetch is outstanding at any time, even across restarts;
//!    ticks and refresh requests that arrive meanwhile are coalesced into it
//! 3. Nothing is written to the store once the loop has stopped
//!
//! ## Usage
//!
//! ```ignore
//! let (events, rx) = EventSender::channel();
//! let sync = SyncLoop::new(transport, credentials, DEFAULT_POLL_INTERVAL, events);
//! sync.start()?;
//! let messages = sync.current();
//! ```

mod poller;
mod state;

pub use poller::{SyncHandle, SyncLoop, DEFAULT_POLL_INTERVAL};
pub use state::{RefreshOutcome, SyncStatus};
