//! Polling sync loop
//!
//! The chat service has no push channel, so the feed is kept fresh by
//! fetching it on a fixed interval. Each fetch runs as its own task; the timer
//! task only decides whether a new one may start.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::state::{RefreshOutcome, SessionState, SyncStatus};
use crate::credentials::CredentialProvider;
use crate::error::{SyncError, TransportError};
use crate::events::{ChatEvent, ErrorReport, EventSender, Operation};
use crate::models::Message;
use crate::store::StoreView;
use crate::transport::{Transport, TransportResult};

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Shortest interval the timer accepts
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// State shared between the loop, its handles and its tasks
struct Shared {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<SessionState>,
    view: StoreView,
    status: watch::Sender<SyncStatus>,
    events: EventSender,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a status change; called with the state lock held
    fn publish_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
        self.events.emit(ChatEvent::StatusChanged(status));
    }

    /// Fetch for the current cycle, if the loop is running
    fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let generation = self.lock().generation;
        self.launch(generation)
    }

    /// Start a fetch task for `generation` unless one is outstanding
    fn launch(self: &Arc<Self>, generation: u64) -> RefreshOutcome {
        let outcome = self.lock().try_launch(generation);
        match outcome {
            RefreshOutcome::Started => {
                tokio::spawn(Arc::clone(self).fetch(generation));
            }
            RefreshOutcome::Coalesced => debug!(generation, "fetch already in flight"),
            RefreshOutcome::NotRunning => {}
        }
        outcome
    }

    async fn fetch(self: Arc<Self>, generation: u64) {
        let credential = self.credentials.credential();
        debug!(
            generation,
            authenticated = credential.is_some(),
            "fetching messages"
        );

        // A panicking transport counts as a failed fetch; the slot must be
        // released either way
        let result = AssertUnwindSafe(async {
            self.transport.fetch_messages(credential.as_ref()).await
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(TransportError::network(panic_message(&*payload))));

        let follow_up = {
            let mut state = self.lock();
            if state.finish(generation) {
                self.apply(&mut state, generation, result);
                None
            } else {
                debug!(generation, "cycle is over, discarding fetch result");
                state.take_owed()
            }
        };

        if let Some(current) = follow_up {
            debug!(generation = current, "fetching for requests held by a stale fetch");
            self.launch(current);
        }
    }

    /// Write a fetch result for the live cycle; called with the state lock held
    fn apply(
        &self,
        state: &mut SessionState,
        generation: u64,
        result: TransportResult<Vec<Message>>,
    ) {
        match result {
            Ok(messages) => {
                let count = messages.len();
                let version = state.store.replace(messages);
                debug!(generation, version, count, "snapshot replaced");
                self.events
                    .emit(ChatEvent::SnapshotReplaced { version, count });
            }
            Err(err) => {
                // The next tick is the retry
                self.events
                    .report(ErrorReport::from_transport(Operation::FetchMessages, &err));
            }
        }

        if state.mark_running() {
            info!(generation, "sync loop running");
            self.publish_status(SyncStatus::Running);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("fetch panicked: {}", detail)
}

/// Timer task: one fetch attempt per tick, the first one immediately
async fn run_timer(shared: Arc<Shared>, generation: u64, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shared.launch(generation) == RefreshOutcome::NotRunning {
            break;
        }
    }
}

/// Periodic fetch loop that owns the message store
///
/// `Stopped -> Starting -> Running -> Stopped`. Restarting opens a new cycle;
/// results from fetches that belong to an earlier cycle are dropped. Dropping
/// the loop stops it.
pub struct SyncLoop {
    shared: Arc<Shared>,
    interval: Duration,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncLoop {
    /// Create a stopped loop
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        interval: Duration,
        events: EventSender,
    ) -> Self {
        let state = SessionState::new();
        let view = state.store.view();
        let (status, _) = watch::channel(SyncStatus::Stopped);

        Self {
            shared: Arc::new(Shared {
                transport,
                credentials,
                state: Mutex::new(state),
                view,
                status,
                events,
            }),
            interval: interval.max(MIN_POLL_INTERVAL),
            poll_handle: Mutex::new(None),
        }
    }

    /// Fetch now, then every interval until [`stop`](Self::stop)
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SyncError> {
        let generation = {
            let mut state = self.shared.lock();
            let generation = state.begin()?;
            self.shared.publish_status(SyncStatus::Starting);
            generation
        };
        info!(
            generation,
            interval_ms = self.interval.as_millis() as u64,
            "sync loop started"
        );

        let handle = tokio::spawn(run_timer(
            Arc::clone(&self.shared),
            generation,
            self.interval,
        ));
        if let Some(previous) = self.poll_handle().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Cancel the timer; outstanding fetches finish but are discarded
    ///
    /// Returns false if the loop was already stopped.
    pub fn stop(&self) -> bool {
        let stopped = {
            let mut state = self.shared.lock();
            let stopped = state.end();
            if stopped {
                self.shared.publish_status(SyncStatus::Stopped);
            }
            stopped
        };

        if let Some(handle) = self.poll_handle().take() {
            handle.abort();
        }
        if stopped {
            info!("sync loop stopped");
        }
        stopped
    }

    /// Fetch immediately, unless a fetch is already outstanding
    pub fn refresh_now(&self) -> RefreshOutcome {
        self.shared.refresh()
    }

    /// Handle for triggering refreshes from elsewhere
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.shared.status.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// True until the first fetch after start completes
    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    /// Whether a fetch is outstanding, including one left over from an
    /// earlier cycle
    pub fn is_fetching(&self) -> bool {
        self.shared.lock().is_fetching()
    }

    /// Read-only view of the message store
    pub fn store(&self) -> StoreView {
        self.shared.view.clone()
    }

    /// Current messages, in server order
    pub fn current(&self) -> Arc<[Message]> {
        self.shared.view.current()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn poll_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.poll_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Cloneable handle to a [`SyncLoop`]
///
/// Does not keep the loop running: once the loop is stopped or dropped,
/// refreshes report [`RefreshOutcome::NotRunning`].
#[derive(Clone)]
pub struct SyncHandle {
    shared: Arc<Shared>,
}

impl SyncHandle {
    pub fn refresh_now(&self) -> RefreshOutcome {
        self.shared.refresh()
    }

    pub fn status(&self) -> SyncStatus {
        *self.shared.status.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    pub fn store(&self) -> StoreView {
        self.shared.view.clone()
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::testing::{anonymous, msg, token, FakeTransport};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn new_loop(
        fake: &Arc<FakeTransport>,
        interval: Duration,
    ) -> (SyncLoop, UnboundedReceiver<ChatEvent>) {
        let (events, rx) = EventSender::channel();
        let sync = SyncLoop::new(fake.clone(), anonymous(), interval, events);
        (sync, rx)
    }

    async fn next_failure(rx: &mut UnboundedReceiver<ChatEvent>) -> ErrorReport {
        loop {
            match rx.recv().await {
                Some(ChatEvent::Failure(report)) => return report,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(60));
        let mut view = sync.store();

        assert_eq!(sync.status(), SyncStatus::Stopped);
        sync.start().unwrap();
        assert!(sync.is_loading());

        view.wait_for_version(1).await.unwrap();
        assert_eq!(&*sync.current(), &[msg("1", "a", "hi")][..]);
        assert_eq!(fake.fetch_calls(), 1);

        settle().await;
        assert_eq!(sync.status(), SyncStatus::Running);
        assert!(!sync.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_fails() {
        let fake = FakeTransport::with_feed(vec![]);
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(60));

        sync.start().unwrap();
        assert_eq!(sync.start(), Err(SyncError::AlreadyRunning));

        settle().await;
        assert_eq!(sync.status(), SyncStatus::Running);
        assert_eq!(sync.start(), Err(SyncError::AlreadyRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_fetch_replaces_snapshot() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "x"), msg("2", "b", "y")]);
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(60));
        let mut view = sync.store();

        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();
        assert_eq!(sync.current().len(), 2);

        fake.set_feed(vec![msg("3", "c", "z")]);
        assert_eq!(sync.refresh_now(), RefreshOutcome::Started);
        view.wait_for_version(2).await.unwrap();
        assert_eq!(&*sync.current(), &[msg("3", "c", "z")][..]);

        fake.set_feed(vec![]);
        sync.refresh_now();
        view.wait_for_version(3).await.unwrap();
        assert!(sync.current().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let (sync, mut rx) = new_loop(&fake, Duration::from_secs(60));
        let mut view = sync.store();

        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();

        fake.script_fetch(Err(TransportError::from_status(500, "boom")));
        sync.refresh_now();
        let report = next_failure(&mut rx).await;

        assert_eq!(report.operation, Operation::FetchMessages);
        assert_eq!(report.kind, ErrorKind::Server);
        assert_eq!(&*sync.current(), &[msg("1", "a", "hi")][..]);
        assert_eq!(view.version(), 1);
        assert_eq!(sync.status(), SyncStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_fetch_clears_loading() {
        let fake = FakeTransport::new();
        fake.script_fetch(Err(TransportError::network("connection refused")));
        let (sync, mut rx) = new_loop(&fake, Duration::from_secs(60));

        sync.start().unwrap();
        let report = next_failure(&mut rx).await;
        assert_eq!(report.kind, ErrorKind::Network);

        assert!(!sync.is_loading());
        assert_eq!(sync.status(), SyncStatus::Running);
        assert!(sync.current().is_empty());
        assert_eq!(sync.store().version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_retried_on_next_tick() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        fake.script_fetch(Err(TransportError::network("offline")));
        let (sync, mut rx) = new_loop(&fake, Duration::from_secs(3));
        let mut view = sync.store();

        sync.start().unwrap();
        next_failure(&mut rx).await;
        assert_eq!(fake.fetch_calls(), 1);

        view.wait_for_version(1).await.unwrap();
        assert_eq!(fake.fetch_calls(), 2);
        assert_eq!(sync.current().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_coalesce_while_fetch_in_flight() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let gate = fake.gate_fetch();
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(3));
        let mut view = sync.store();

        sync.start().unwrap();
        // Ticks at 3s, 6s and 9s all find the first fetch outstanding
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fake.fetch_calls(), 1);
        assert!(sync.is_fetching());
        assert_eq!(sync.refresh_now(), RefreshOutcome::Coalesced);
        assert_eq!(fake.fetch_calls(), 1);

        gate.send(()).unwrap();
        view.wait_for_version(1).await.unwrap();
        assert!(!sync.is_fetching());

        // Next tick (12s) fetches again
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fake.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_stop_is_discarded() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let (sync, mut rx) = new_loop(&fake, Duration::from_secs(60));
        let mut view = sync.store();

        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();

        let gate = fake.gate_fetch();
        fake.set_feed(vec![msg("2", "b", "late")]);
        assert_eq!(sync.refresh_now(), RefreshOutcome::Started);
        settle().await;
        assert_eq!(fake.fetch_calls(), 2);

        assert!(sync.stop());
        gate.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(&*sync.current(), &[msg("1", "a", "hi")][..]);
        assert_eq!(view.version(), 1);
        assert_eq!(fake.fetch_calls(), 2);

        // Nothing after the stop notification touches the store
        let mut after_stop = Vec::new();
        while let Ok(event) = rx.try_recv() {
            after_stop.push(event);
        }
        let stop_at = after_stop
            .iter()
            .position(|e| *e == ChatEvent::StatusChanged(SyncStatus::Stopped))
            .unwrap();
        assert!(after_stop[stop_at..]
            .iter()
            .all(|e| !matches!(e, ChatEvent::SnapshotReplaced { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_stale_fetch() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "old")]);
        let gate = fake.gate_fetch();
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(60));
        let mut view = sync.store();

        // First cycle's fetch hangs
        sync.start().unwrap();
        settle().await;
        assert!(sync.stop());
        assert_eq!(sync.status(), SyncStatus::Stopped);

        // Second cycle's first fetch coalesces into the outstanding one
        fake.set_feed(vec![msg("2", "b", "new")]);
        sync.start().unwrap();
        settle().await;
        assert_eq!(fake.fetch_calls(), 1);
        assert!(sync.is_fetching());
        assert!(sync.is_loading());
        assert_eq!(sync.refresh_now(), RefreshOutcome::Coalesced);

        // Stale result is dropped and the new cycle fetches right away
        gate.send(()).unwrap();
        view.wait_for_version(1).await.unwrap();
        assert_eq!(fake.fetch_calls(), 2);
        assert_eq!(&*sync.current(), &[msg("2", "b", "new")][..]);
        assert!(!sync.is_loading());

        settle().await;
        assert_eq!(sync.status(), SyncStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_outstanding_fetch_across_restarts() {
        let fake = FakeTransport::with_feed(vec![]);
        let first = fake.gate_fetch();
        let _second = fake.gate_fetch();
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(3));

        sync.start().unwrap();
        settle().await;
        sync.stop();
        sync.start().unwrap();
        settle().await;
        sync.stop();
        sync.start().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fake.fetch_calls(), 1);

        // Released slot goes to the live cycle, one request at a time
        first.send(()).unwrap();
        settle().await;
        assert_eq!(fake.fetch_calls(), 2);
        assert!(sync.is_fetching());
    }

    struct PanickyTransport {
        inner: Arc<FakeTransport>,
        armed: std::sync::atomic::AtomicBool,
    }

    impl Transport for PanickyTransport {
        fn fetch_messages<'a>(
            &'a self,
            credential: Option<&'a crate::credentials::Credential>,
        ) -> futures_util::future::BoxFuture<'a, TransportResult<Vec<Message>>> {
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                panic!("decoder exploded");
            }
            self.inner.fetch_messages(credential)
        }

        fn send_message<'a>(
            &'a self,
            credential: Option<&'a crate::credentials::Credential>,
            text: &'a str,
        ) -> futures_util::future::BoxFuture<'a, TransportResult<()>> {
            self.inner.send_message(credential, text)
        }

        fn delete_message<'a>(
            &'a self,
            credential: Option<&'a crate::credentials::Credential>,
            id: &'a str,
        ) -> futures_util::future::BoxFuture<'a, TransportResult<()>> {
            self.inner.delete_message(credential, id)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_is_reported_and_retried() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let transport = Arc::new(PanickyTransport {
            inner: fake.clone(),
            armed: std::sync::atomic::AtomicBool::new(true),
        });
        let (events, mut rx) = EventSender::channel();
        let sync = SyncLoop::new(transport, anonymous(), Duration::from_secs(3), events);
        let mut view = sync.store();

        sync.start().unwrap();
        let report = next_failure(&mut rx).await;
        assert_eq!(report.operation, Operation::FetchMessages);
        assert_eq!(report.kind, ErrorKind::Network);
        assert!(report.message.contains("decoder exploded"));
        assert!(!sync.is_fetching());
        assert!(!sync.is_loading());
        assert_eq!(sync.status(), SyncStatus::Running);

        // Next tick fetches normally
        view.wait_for_version(1).await.unwrap();
        assert_eq!(fake.fetch_calls(), 1);
        assert_eq!(&*sync.current(), &[msg("1", "a", "hi")][..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let fake = FakeTransport::new();
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(3));

        assert!(!sync.stop());
        sync.start().unwrap();
        assert!(sync.stop());
        assert!(!sync.stop());
        assert_eq!(sync.refresh_now(), RefreshOutcome::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_loop_never_fetches() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(3));

        assert_eq!(sync.refresh_now(), RefreshOutcome::NotRunning);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fake.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let fake = FakeTransport::with_feed(vec![]);
        let (sync, _rx) = new_loop(&fake, Duration::from_secs(3));
        let handle = sync.handle();
        let mut view = sync.store();

        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();
        drop(sync);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fake.fetch_calls(), 1);
        assert_eq!(handle.status(), SyncStatus::Stopped);
        assert_eq!(handle.refresh_now(), RefreshOutcome::NotRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_events() {
        let fake = FakeTransport::with_feed(vec![msg("1", "a", "hi")]);
        let (sync, mut rx) = new_loop(&fake, Duration::from_secs(60));

        sync.start().unwrap();
        settle().await;
        sync.stop();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                ChatEvent::StatusChanged(SyncStatus::Starting),
                ChatEvent::SnapshotReplaced {
                    version: 1,
                    count: 1
                },
                ChatEvent::StatusChanged(SyncStatus::Running),
                ChatEvent::StatusChanged(SyncStatus::Stopped),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_attached_when_present() {
        let fake = FakeTransport::with_feed(vec![]);
        let (events, _rx) = EventSender::channel();
        let sync = SyncLoop::new(fake.clone(), token("abc"), Duration::from_secs(60), events);
        let mut view = sync.store();
        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();
        assert_eq!(fake.credentials_seen(), vec![Some("abc".to_string())]);

        let anon = FakeTransport::with_feed(vec![]);
        let (sync, _rx) = new_loop(&anon, Duration::from_secs(60));
        let mut view = sync.store();
        sync.start().unwrap();
        view.wait_for_version(1).await.unwrap();
        assert_eq!(anon.credentials_seen(), vec![None]);
    }
}
