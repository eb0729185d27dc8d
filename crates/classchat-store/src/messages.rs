use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use classchat_shared::constants::STORE_CHANGE_CAPACITY;
use classchat_shared::{ClientTempId, Message, MessageId, OrderKey, RoomId};

use crate::error::{Result, StoreError};

/// Structural change notifications sent to subscribed views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A new entry became visible.
    Inserted(MessageId),
    /// An existing entry was overwritten (possibly moving position).
    Updated(MessageId),
    /// A provisional entry was swapped for its confirmed record.
    Confirmed {
        temp_id: ClientTempId,
        id: MessageId,
    },
    /// A provisional entry was dropped because its send failed.
    Discarded(ClientTempId),
}

/// What an insert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Updated,
    /// Identical record already present; nothing changed.
    Unchanged,
    /// Replaced a provisional entry.
    Confirmed,
    /// Optimistic insert for a temp id that is already confirmed.
    Ignored,
}

#[derive(Default)]
struct StoreInner {
    entries: BTreeMap<OrderKey, Message>,
    index: HashMap<MessageId, OrderKey>,
    /// temp id -> id of its provisional entry
    provisional: HashMap<ClientTempId, MessageId>,
    confirmed_temps: HashSet<ClientTempId>,
    latest_confirmed: Option<DateTime<Utc>>,
}

impl StoreInner {
    fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let key = self.index.remove(id)?;
        self.entries.remove(&key)
    }

    fn put(&mut self, message: Message) {
        let key = message.order_key();
        self.index.insert(message.id.clone(), key.clone());
        self.entries.insert(key, message);
    }
}

/// Ordered, deduplicated message collection for one room.
///
/// All methods take `&self`; the store is meant to be shared behind an `Arc`
/// between the subscription task, the session and rendered views. The
/// internal lock is never held across an await point.
pub struct MessageStore {
    room_id: RoomId,
    inner: Mutex<StoreInner>,
    changes: broadcast::Sender<StoreChange>,
}

impl MessageStore {
    pub fn new(room_id: RoomId) -> Self {
        let (changes, _) = broadcast::channel(STORE_CHANGE_CAPACITY);
        Self {
            room_id,
            inner: Mutex::new(StoreInner::default()),
            changes,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Subscribe to structural change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Insert or overwrite a confirmed record.
    ///
    /// Idempotent by id. If the record echoes the temp id of a provisional
    /// entry, that entry is removed under the same lock so both copies are
    /// never visible together.
    pub fn insert(&self, record: Message) -> Result<InsertOutcome> {
        self.check_room(&record)?;

        let id = record.id.clone();
        let (outcome, change) = {
            let mut inner = self.lock();

            let mut replaced_temp = None;
            if let Some(temp) = record.client_temp_id.clone() {
                if let Some(provisional_id) = inner.provisional.remove(&temp) {
                    inner.remove(&provisional_id);
                    replaced_temp = Some(temp.clone());
                }
                inner.confirmed_temps.insert(temp);
            }

            let existing = inner.index.get(&id).cloned();
            let outcome = match (existing, &replaced_temp) {
                (_, Some(_)) => {
                    inner.remove(&id);
                    InsertOutcome::Confirmed
                }
                (Some(key), None) => {
                    if inner.entries.get(&key) == Some(&record) {
                        InsertOutcome::Unchanged
                    } else {
                        inner.remove(&id);
                        InsertOutcome::Updated
                    }
                }
                (None, None) => InsertOutcome::Inserted,
            };

            if outcome != InsertOutcome::Unchanged {
                if inner.latest_confirmed.map_or(true, |t| record.created_at > t) {
                    inner.latest_confirmed = Some(record.created_at);
                }
                inner.put(record);
            }

            let change = match (outcome, replaced_temp) {
                (InsertOutcome::Confirmed, Some(temp_id)) => Some(StoreChange::Confirmed {
                    temp_id,
                    id: id.clone(),
                }),
                (InsertOutcome::Inserted, _) => Some(StoreChange::Inserted(id.clone())),
                (InsertOutcome::Updated, _) => Some(StoreChange::Updated(id.clone())),
                _ => None,
            };
            (outcome, change)
        };

        trace!(room = %self.room_id, msg_id = %id, outcome = ?outcome, "Insert");
        if let Some(change) = change {
            self.notify(change);
        }
        Ok(outcome)
    }

    /// Show a locally composed record before the backend confirms it.
    ///
    /// The entry is stored under [`ClientTempId::provisional_message_id`];
    /// the record's own `id` is ignored.
    pub fn insert_optimistic(
        &self,
        mut record: Message,
        temp_id: ClientTempId,
    ) -> Result<InsertOutcome> {
        self.check_room(&record)?;

        let provisional_id = temp_id.provisional_message_id();
        record.id = provisional_id.clone();
        record.client_temp_id = Some(temp_id.clone());

        let outcome = {
            let mut inner = self.lock();
            if inner.confirmed_temps.contains(&temp_id) {
                debug!(room = %self.room_id, temp_id = %temp_id, "Optimistic record already confirmed");
                return Ok(InsertOutcome::Ignored);
            }
            let outcome = match inner.provisional.insert(temp_id.clone(), provisional_id.clone()) {
                Some(previous) => {
                    inner.remove(&previous);
                    InsertOutcome::Updated
                }
                None => InsertOutcome::Inserted,
            };
            inner.put(record);
            outcome
        };

        self.notify(match outcome {
            InsertOutcome::Updated => StoreChange::Updated(provisional_id),
            _ => StoreChange::Inserted(provisional_id),
        });
        Ok(outcome)
    }

    /// Drop a provisional entry whose send failed. Returns whether one existed.
    pub fn discard_optimistic(&self, temp_id: &ClientTempId) -> bool {
        let removed = {
            let mut inner = self.lock();
            match inner.provisional.remove(temp_id) {
                Some(provisional_id) => inner.remove(&provisional_id).is_some(),
                None => false,
            }
        };
        if removed {
            debug!(room = %self.room_id, temp_id = %temp_id, "Discarded optimistic record");
            self.notify(StoreChange::Discarded(temp_id.clone()));
        }
        removed
    }

    /// Insert a fetched page. Records for other rooms are skipped.
    /// Returns the number of structural changes.
    pub fn insert_page(&self, records: impl IntoIterator<Item = Message>) -> usize {
        let mut changed = 0;
        for record in records {
            match self.insert(record) {
                Ok(InsertOutcome::Unchanged | InsertOutcome::Ignored) => {}
                Ok(_) => changed += 1,
                Err(e) => warn!(room = %self.room_id, error = %e, "Skipping record in page"),
            }
        }
        changed
    }

    /// Snapshot of all entries in display order.
    pub fn all(&self) -> Vec<Message> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        let inner = self.lock();
        let key = inner.index.get(id)?;
        inner.entries.get(key).cloned()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.lock().index.contains_key(id)
    }

    pub fn is_provisional(&self, id: &MessageId) -> bool {
        self.lock().provisional.values().any(|p| p == id)
    }

    /// Newest `created_at` among confirmed records; the reconciliation cursor.
    pub fn latest_confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.lock().latest_confirmed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_room(&self, record: &Message) -> Result<()> {
        if record.room_id != self.room_id {
            return Err(StoreError::WrongRoom {
                expected: self.room_id.clone(),
                found: record.room_id.clone(),
            });
        }
        Ok(())
    }

    fn notify(&self, change: StoreChange) {
        if let Err(e) = self.changes.send(change) {
            trace!(room = %self.room_id, change = ?e.0, "No store subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
