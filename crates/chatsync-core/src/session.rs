//! Chat session
//!
//! Wires a transport and a credential provider into one sync loop, one
//! mutation coordinator and one event channel. A session corresponds to one
//! mounted chat view; nothing is shared between sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::credentials::{CredentialProvider, StaticCredential};
use crate::error::{SyncError, TransportError};
use crate::events::{ChatEvent, EventSender};
use crate::mutation::MutationCoordinator;
use crate::presenter::{ChatPresenter, Viewer};
use crate::sync::SyncLoop;
use crate::transport::{HttpTransport, Transport};

/// One chat view's worth of sync state
pub struct ChatSession {
    id: String,
    sync: SyncLoop,
    coordinator: Arc<MutationCoordinator>,
    events: Option<mpsc::UnboundedReceiver<ChatEvent>>,
}

impl ChatSession {
    /// Create a stopped session
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        poll_interval: Duration,
    ) -> Self {
        let (events, events_rx) = EventSender::channel();
        let sync = SyncLoop::new(
            Arc::clone(&transport),
            Arc::clone(&credentials),
            poll_interval,
            events.clone(),
        );
        let coordinator = Arc::new(MutationCoordinator::new(
            transport,
            credentials,
            Arc::new(sync.handle()),
            events,
        ));

        Self {
            id: format!("chatsync-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            sync,
            coordinator,
            events: Some(events_rx),
        }
    }

    /// Create a session talking HTTP to the configured server
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let transport = HttpTransport::with_timeout(&config.server_url, config.request_timeout())?;
        let credentials = StaticCredential::new(config.token.clone());
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(credentials),
            config.poll_interval(),
        ))
    }

    /// Session identifier, for logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start polling
    pub fn start(&self) -> Result<(), SyncError> {
        info!(session = %self.id, "starting chat session");
        self.sync.start()
    }

    /// Stop polling; returns false if already stopped
    pub fn stop(&self) -> bool {
        info!(session = %self.id, "stopping chat session");
        self.sync.stop()
    }

    pub fn sync(&self) -> &SyncLoop {
        &self.sync
    }

    pub fn coordinator(&self) -> &Arc<MutationCoordinator> {
        &self.coordinator
    }

    /// Presenter for the given viewer
    pub fn presenter(&self, viewer: Viewer) -> ChatPresenter {
        ChatPresenter::new(viewer, self.coordinator.clone(), self.sync.handle())
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ChatEvent>> {
        self.events.take()
    }
}
