//! Command handlers

pub mod config;
pub mod delete;
pub mod list;
pub mod send;
pub mod watch;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use chatsync_core::{ChatEvent, ChatSession, Config, ErrorReport};

/// Build a session for the configured server, with its event receiver
pub(crate) fn open_session(
    config: &Config,
) -> Result<(ChatSession, mpsc::UnboundedReceiver<ChatEvent>)> {
    let mut session = ChatSession::from_config(config).context("Failed to create chat session")?;
    let events = session
        .take_events()
        .context("Session event channel already taken")?;
    Ok((session, events))
}

/// Drain queued events, keeping only failures
pub(crate) fn drain_failures(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ErrorReport> {
    std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            ChatEvent::Failure(report) => Some(report),
            _ => None,
        })
        .collect()
}
