//! chatsync Core Library
//!
//! This crate keeps a local, read-mostly copy of a chat room's message feed
//! in step with a remote chat service by polling, and routes user mutations
//! (send, delete) through a single coordinator.
//!
//! # Architecture
//!
//! - **Server is the source of truth**: the store is only ever replaced
//!   wholesale by a fetch result, never patched locally
//! - **Refresh after mutate**: a successful send or delete asks the sync loop
//!   for an immediate fetch instead of editing the store
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut session = ChatSession::from_config(&config)?;
//! let events = session.take_events();
//! session.start()?;
//!
//! session.coordinator().send("hello").await?;
//! let messages = session.sync().current();
//! ```
//!
//! # Modules
//!
//! - `session`: Wires everything for one chat view (main entry point)
//! - `sync`: Polling loop with coalesced refreshes
//! - `mutation`: Send and delete with in-flight guards
//! - `store`: Versioned snapshot of the feed
//! - `transport`: Chat service client and wire format
//! - `presenter`: Render model and role gating
//! - `events`: Status and failure notifications
//! - `config`: Application configuration

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod models;
pub mod mutation;
pub mod presenter;
pub mod session;
pub mod store;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use credentials::{Credential, CredentialProvider, StaticCredential};
pub use error::{ErrorKind, MutationError, SyncError, TransportError};
pub use events::{ChatEvent, ErrorReport, EventSender, Operation};
pub use models::Message;
pub use mutation::{MutationCoordinator, MutationState, Refresh, SendOutcome};
pub use presenter::{ChatPresenter, FeedView, Mutations, PresenterError, Role, Viewer};
pub use session::ChatSession;
pub use store::{MessageStore, Snapshot, StoreView};
pub use sync::{RefreshOutcome, SyncHandle, SyncLoop, SyncStatus, DEFAULT_POLL_INTERVAL};
pub use transport::{HttpTransport, Transport};
