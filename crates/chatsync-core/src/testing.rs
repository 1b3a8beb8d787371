//! In-memory transport for tests
//!
//! Behaves like a small chat server by default: fetch returns the current
//! feed, send appends, delete removes or answers 404. Individual calls can be
//! scripted with an explicit result, and held back with a gate until the
//! test releases them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::oneshot;

use crate::credentials::{Credential, StaticCredential};
use crate::error::TransportError;
use crate::models::Message;
use crate::transport::{Transport, TransportResult};

/// Build a message with a deterministic timestamp
pub(crate) fn msg(id: &str, username: &str, text: &str) -> Message {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let offset = id.parse::<i64>().unwrap_or(0);
    Message::new(id, username, text, base + ChronoDuration::seconds(offset))
}

pub(crate) fn anonymous() -> Arc<StaticCredential> {
    Arc::new(StaticCredential::anonymous())
}

pub(crate) fn token(value: &str) -> Arc<StaticCredential> {
    Arc::new(StaticCredential::new(Some(value.to_string())))
}

#[derive(Default)]
struct Script {
    fetches: VecDeque<TransportResult<Vec<Message>>>,
    sends: VecDeque<TransportResult<()>>,
    deletes: VecDeque<TransportResult<()>>,
    fetch_gates: VecDeque<oneshot::Receiver<()>>,
    send_gates: VecDeque<oneshot::Receiver<()>>,
    delete_gates: VecDeque<oneshot::Receiver<()>>,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    feed: Mutex<Vec<Message>>,
    script: Mutex<Script>,
    next_id: AtomicUsize,
    fetch_calls: AtomicUsize,
    send_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    sent: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    credentials: Mutex<Vec<Option<String>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_feed(feed: Vec<Message>) -> Arc<Self> {
        let fake = Self::default();
        fake.next_id.store(feed.len(), Ordering::SeqCst);
        *fake.feed.lock().unwrap() = feed;
        Arc::new(fake)
    }

    pub(crate) fn set_feed(&self, feed: Vec<Message>) {
        *self.feed.lock().unwrap() = feed;
    }

    pub(crate) fn script_fetch(&self, result: TransportResult<Vec<Message>>) {
        self.script.lock().unwrap().fetches.push_back(result);
    }

    pub(crate) fn script_send(&self, result: TransportResult<()>) {
        self.script.lock().unwrap().sends.push_back(result);
    }

    pub(crate) fn script_delete(&self, result: TransportResult<()>) {
        self.script.lock().unwrap().deletes.push_back(result);
    }

    /// Hold the next fetch until the returned sender fires (or is dropped)
    pub(crate) fn gate_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().fetch_gates.push_back(rx);
        tx
    }

    pub(crate) fn gate_send(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().send_gates.push_back(rx);
        tx
    }

    pub(crate) fn gate_delete(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().delete_gates.push_back(rx);
        tx
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub(crate) fn credentials_seen(&self) -> Vec<Option<String>> {
        self.credentials.lock().unwrap().clone()
    }

    fn record_credential(&self, credential: Option<&Credential>) {
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(|c| c.token().to_string()));
    }
}

async fn wait(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

impl Transport for FakeTransport {
    fn fetch_messages<'a>(
        &'a self,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, TransportResult<Vec<Message>>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.record_credential(credential);

        let (scripted, gate) = {
            let mut script = self.script.lock().unwrap();
            (script.fetches.pop_front(), script.fetch_gates.pop_front())
        };
        let result = scripted.unwrap_or_else(|| Ok(self.feed.lock().unwrap().clone()));

        async move {
            wait(gate).await;
            result
        }
        .boxed()
    }

    fn send_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        text: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.record_credential(credential);

        let (scripted, gate) = {
            let mut script = self.script.lock().unwrap();
            (script.sends.pop_front(), script.send_gates.pop_front())
        };

        async move {
            wait(gate).await;
            let result = scripted.unwrap_or(Ok(()));
            if result.is_ok() {
                self.sent.lock().unwrap().push(text.to_string());
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let username = credential.map(|c| c.token()).unwrap_or("anonymous");
                self.feed
                    .lock()
                    .unwrap()
                    .push(msg(&id.to_string(), username, text.trim()));
            }
            result
        }
        .boxed()
    }

    fn delete_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        id: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.record_credential(credential);

        let (scripted, gate) = {
            let mut script = self.script.lock().unwrap();
            (script.deletes.pop_front(), script.delete_gates.pop_front())
        };

        async move {
            wait(gate).await;
            if let Some(result) = scripted {
                return result;
            }
            let mut feed = self.feed.lock().unwrap();
            let before = feed.len();
            feed.retain(|m| m.id != id);
            if feed.len() == before {
                return Err(TransportError::from_status(404, "Message not found"));
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
        .boxed()
    }
}
