//! Transport to the chat service
//!
//! The engine talks to the remote message store only through this trait, so
//! the HTTP client can be swapped for a fake in tests or a different wire
//! protocol in other front ends.
//!
//! ## Contract
//!
//! | Operation | Success | Failure |
//! |---|---|---|
//! | `fetch_messages` | messages in server order | [`TransportError`] |
//! | `send_message` | `()` (accepted) | [`TransportError`] |
//! | `delete_message` | `()` (deleted) | [`TransportError`], including 404 |
//!
//! The credential is attached to a request only when one is present.

mod http;
mod wire;

pub use http::HttpTransport;
pub use wire::{decode_messages, encode_send_body, WireMessage};

use futures_util::future::BoxFuture;

use crate::credentials::Credential;
use crate::error::TransportError;
use crate::models::Message;

/// Result type for transport calls
pub type TransportResult<T> = Result<T, TransportError>;

/// Request/response access to the chat feed
pub trait Transport: Send + Sync {
    /// Fetch the current feed, in the order the server returns it
    fn fetch_messages<'a>(
        &'a self,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, TransportResult<Vec<Message>>>;

    /// Post a new message
    fn send_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        text: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>>;

    /// Delete a message by id
    fn delete_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        id: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>>;
}
