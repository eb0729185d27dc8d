//! Live-update feed management for open rooms.
//!
//! Each open room gets a dedicated tokio task that keeps the backend feed
//! connected and writes every insert/update into the room's
//! [`MessageStore`]. The task walks the state machine
//!
//! ```text
//! Connecting -> Live -> (Reconnecting -> Live)* -> Closed
//! ```
//!
//! and, on every return to `Live` after a gap, issues one reconciliation
//! fetch for messages newer than the last record the feed delivered, since
//! the transport does not replay events missed while disconnected. A failed
//! reconciliation is retried with the reconnect backoff while the feed stays
//! up.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use classchat_shared::{ChannelError, FetchError, Message, RoomId};
use classchat_store::MessageStore;

use crate::backend::MessageBackend;
use crate::feed::FeedEvent;
use crate::reconnect::ReconnectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Live,
    Reconnecting,
    Closed,
}

/// Observable status of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Consecutive failed connection attempts.
    pub failures: u32,
    /// Completed reconciliation fetches.
    pub reconciliations: u32,
    /// Set when the user should be told about the connection.
    pub alert: Option<ChannelError>,
}

impl ChannelStatus {
    fn connecting() -> Self {
        Self {
            state: ChannelState::Connecting,
            failures: 0,
            reconciliations: 0,
            alert: None,
        }
    }
}

/// Opens room feeds. At most one subscription per room is active at a time.
pub struct SubscriptionChannel {
    backend: Arc<dyn MessageBackend>,
    policy: ReconnectPolicy,
    open_rooms: Arc<Mutex<HashSet<RoomId>>>,
}

impl SubscriptionChannel {
    pub fn new(backend: Arc<dyn MessageBackend>, policy: ReconnectPolicy) -> Self {
        Self {
            backend,
            policy,
            open_rooms: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start delivering the feed of `store`'s room into `store`.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`ChannelError::AlreadyOpen`] while a previous handle for the same
    /// room is still open.
    pub fn open(&self, store: Arc<MessageStore>) -> Result<SubscriptionHandle, ChannelError> {
        let room_id = store.room_id().clone();
        {
            let mut rooms = self.open_rooms.lock().unwrap_or_else(PoisonError::into_inner);
            if !rooms.insert(room_id.clone()) {
                return Err(ChannelError::AlreadyOpen(room_id));
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::connecting());
        let delivering = Arc::new(AtomicBool::new(true));

        let worker = FeedWorker {
            room_id: room_id.clone(),
            backend: self.backend.clone(),
            store,
            policy: self.policy.clone(),
            status: status_tx,
            delivering: delivering.clone(),
            cursor: None,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));

        info!(room = %room_id, "Subscription opened");

        Ok(SubscriptionHandle {
            room_id,
            status: status_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            delivering,
            open_rooms: self.open_rooms.clone(),
            released: false,
        })
    }

    pub fn is_open(&self, room_id: &RoomId) -> bool {
        self.open_rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(room_id)
    }
}

/// Owner of one open room feed.
///
/// Teardown runs exactly once, through [`close`](Self::close) or on drop.
pub struct SubscriptionHandle {
    room_id: RoomId,
    status: watch::Receiver<ChannelStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    delivering: Arc<AtomicBool>,
    open_rooms: Arc<Mutex<HashSet<RoomId>>>,
    released: bool,
}

impl SubscriptionHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Stop delivery and wait for the feed task to finish.
    ///
    /// Safe to call repeatedly. Once it returns, the store receives no
    /// further writes from this subscription.
    pub async fn close(&mut self) {
        self.delivering.store(false, Ordering::Release);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(room = %self.room_id, error = %e, "Subscription task failed");
                }
            }
        }
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.open_rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.room_id);
        debug!(room = %self.room_id, "Subscription released");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.delivering.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.release();
    }
}

struct FeedWorker {
    room_id: RoomId,
    backend: Arc<dyn MessageBackend>,
    store: Arc<MessageStore>,
    policy: ReconnectPolicy,
    status: watch::Sender<ChannelStatus>,
    delivering: Arc<AtomicBool>,
    /// Newest `created_at` received from the feed or a catch-up page.
    /// Records the store got from elsewhere (local sends) never move it, so
    /// a gap in the feed is always fetched from where the feed left off.
    cursor: Option<DateTime<Utc>>,
}

impl FeedWorker {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut was_live = false;
        let mut needs_reconcile = false;
        let mut failures: u32 = 0;

        'outer: loop {
            let connected = tokio::select! {
                _ = &mut shutdown => break 'outer,
                r = self.backend.subscribe_to_room(&self.room_id) => r,
            };

            match connected {
                Ok(mut feed) => {
                    failures = 0;
                    self.status.send_modify(|s| {
                        s.state = ChannelState::Live;
                        s.failures = 0;
                        s.alert = None;
                    });
                    info!(room = %self.room_id, reconnect = was_live, "Feed live");
                    was_live = true;

                    // Fires immediately; re-armed with backoff after a failed
                    // catch-up so the gap is filled while the feed stays up.
                    let catch_up = tokio::time::sleep(Duration::ZERO);
                    tokio::pin!(catch_up);
                    let mut catch_up_failures: u32 = 0;

                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut shutdown => break 'outer,
                            _ = &mut catch_up, if needs_reconcile => {
                                let since = self.cursor;
                                let fetched = tokio::select! {
                                    _ = &mut shutdown => break 'outer,
                                    r = self.backend.fetch_recent_messages(&self.room_id, since) => r,
                                };
                                match fetched {
                                    Ok(records) => {
                                        needs_reconcile = false;
                                        let count = records.len();
                                        let changed = self.deliver_page(records);
                                        self.status.send_modify(|s| s.reconciliations += 1);
                                        info!(
                                            room = %self.room_id,
                                            fetched = count,
                                            changed,
                                            "Reconciled after reconnect"
                                        );
                                    }
                                    Err(e) => {
                                        catch_up_failures += 1;
                                        let delay = self.policy.delay_for(catch_up_failures);
                                        warn!(
                                            room = %self.room_id,
                                            attempts = catch_up_failures,
                                            retry_ms = delay.as_millis() as u64,
                                            error = %e,
                                            "Reconciliation fetch failed"
                                        );
                                        catch_up
                                            .as_mut()
                                            .reset(tokio::time::Instant::now() + delay);
                                    }
                                }
                            }
                            item = feed.next() => match item {
                                Some(Ok(event)) => self.deliver(event),
                                Some(Err(e)) => {
                                    warn!(room = %self.room_id, error = %e, "Feed error");
                                    break;
                                }
                                None => {
                                    warn!(room = %self.room_id, "Feed ended");
                                    break;
                                }
                            },
                        }
                    }

                    needs_reconcile = true;
                    self.status
                        .send_modify(|s| s.state = ChannelState::Reconnecting);
                }
                Err(FetchError::NotFound(reason)) => {
                    error!(room = %self.room_id, reason = %reason, "Room not found, closing feed");
                    self.status.send_modify(|s| {
                        s.state = ChannelState::Closed;
                        s.alert = Some(ChannelError::RoomUnavailable(self.room_id.clone()));
                    });
                    self.delivering.store(false, Ordering::Release);
                    return;
                }
                Err(e) => {
                    failures += 1;
                    let alert = self.policy.should_alert(failures).then(|| {
                        ChannelError::ReconnectFailing {
                            room_id: self.room_id.clone(),
                            attempts: failures,
                        }
                    });
                    if alert.is_some() {
                        error!(room = %self.room_id, attempts = failures, error = %e, "Reconnect keeps failing");
                    } else {
                        warn!(room = %self.room_id, attempts = failures, error = %e, "Feed connect failed");
                    }
                    self.status.send_modify(|s| {
                        s.state = if was_live {
                            ChannelState::Reconnecting
                        } else {
                            ChannelState::Connecting
                        };
                        s.failures = failures;
                        s.alert = alert;
                    });
                }
            }

            let delay = self.policy.delay_for(failures + 1);
            debug!(room = %self.room_id, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            tokio::select! {
                _ = &mut shutdown => break 'outer,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.send_modify(|s| s.state = ChannelState::Closed);
        info!(room = %self.room_id, "Subscription closed");
    }

    fn advance_cursor(&mut self, created_at: DateTime<Utc>) {
        if self.cursor.map_or(true, |c| created_at > c) {
            self.cursor = Some(created_at);
        }
    }

    fn deliver(&mut self, event: FeedEvent) {
        if !self.delivering.load(Ordering::Acquire) {
            return;
        }
        let kind = event.kind;
        let id = event.record.id.clone();
        let created_at = event.record.created_at;
        match self.store.insert(event.record) {
            Ok(outcome) => {
                self.advance_cursor(created_at);
                debug!(room = %self.room_id, msg_id = %id, kind = ?kind, outcome = ?outcome, "Feed event applied")
            }
            Err(e) => warn!(room = %self.room_id, msg_id = %id, error = %e, "Feed event rejected"),
        }
    }

    fn deliver_page(&mut self, records: Vec<Message>) -> usize {
        if !self.delivering.load(Ordering::Acquire) {
            return 0;
        }
        let newest = records
            .iter()
            .filter(|m| &m.room_id == self.store.room_id())
            .map(|m| m.created_at)
            .max();
        if let Some(created_at) = newest {
            self.advance_cursor(created_at);
        }
        self.store.insert_page(records)
    }
}
