//! Message store
//!
//! Holds the latest feed snapshot. The only way to change it is
//! [`MessageStore::replace`], which swaps the whole sequence at once; there is
//! no per-message insert, update or removal. Readers hold a [`StoreView`],
//! which sees every replacement as one atomic step.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::Message;

/// One published state of the store
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Number of replacements applied so far (0 = never loaded)
    pub version: u64,
    /// Messages in server order
    pub messages: Arc<[Message]>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            messages: Arc::from(Vec::new()),
        }
    }
}

/// In-memory ordered message collection
#[derive(Debug)]
pub struct MessageStore {
    tx: watch::Sender<Snapshot>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::empty());
        Self { tx }
    }

    /// Substitute the stored sequence, returning the new version
    pub fn replace(&mut self, messages: Vec<Message>) -> u64 {
        let messages: Arc<[Message]> = Arc::from(messages);
        let mut version = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.messages = messages;
            version = snapshot.version;
        });
        version
    }

    /// The present ordered view
    pub fn current(&self) -> Arc<[Message]> {
        Arc::clone(&self.tx.borrow().messages)
    }

    /// Current snapshot version
    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Read-only handle that observes replacements
    pub fn view(&self) -> StoreView {
        StoreView {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of a [`MessageStore`]
#[derive(Debug, Clone)]
pub struct StoreView {
    rx: watch::Receiver<Snapshot>,
}

impl StoreView {
    /// The present ordered view
    pub fn current(&self) -> Arc<[Message]> {
        Arc::clone(&self.rx.borrow().messages)
    }

    /// Current snapshot version
    pub fn version(&self) -> u64 {
        self.rx.borrow().version
    }

    /// Whole current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next replacement
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the store reaches at least `version`
    pub async fn wait_for_version(&mut self, version: u64) -> Option<Snapshot> {
        self.rx
            .wait_for(|snapshot| snapshot.version >= version)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
