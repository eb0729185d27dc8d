//! Hand-written collaborator doubles for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};

use classchat_net::{FeedStream, MessageBackend, ObjectStorage, OutgoingMessage};
use classchat_shared::{
    ChatError, FetchError, Message, MessageId, RoomId, RoomVariant, User, UserId,
};

use crate::actions::{ActionSheet, Clipboard, ReactionPicker};

pub fn msg(room: &str, id: &str, secs: i64) -> Message {
    Message {
        id: MessageId::from(id),
        room_id: RoomId::from(room),
        author_id: UserId::from("alice"),
        content: format!("message {id}"),
        created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        image_key: None,
        image_width: None,
        image_height: None,
        audio_key: None,
        reply_to_message_id: None,
        client_temp_id: None,
    }
}

pub fn user(id: &str, name: &str) -> User {
    User {
        id: UserId::from(id),
        name: name.to_string(),
        image_key: Some(format!("avatars/{id}.png")),
        status: None,
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub messages: Mutex<HashMap<(RoomVariant, MessageId), Message>>,
    pub users: Mutex<HashMap<UserId, User>>,
    pub recent: Mutex<Vec<Message>>,
    pub recent_error: Mutex<Option<FetchError>>,
    /// Errors returned by the next `fetch_message` calls, in order.
    pub fetch_errors: Mutex<VecDeque<FetchError>>,
    pub fetch_delay: Mutex<Duration>,
    pub fetch_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub recent_calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub send_fails: AtomicBool,
}

impl MockBackend {
    pub fn add_message(&self, variant: RoomVariant, message: Message) {
        self.messages
            .lock()
            .unwrap()
            .insert((variant, message.id.clone()), message);
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl MessageBackend for MockBackend {
    async fn fetch_message(
        &self,
        variant: RoomVariant,
        id: &MessageId,
    ) -> Result<Option<Message>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.fetch_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&(variant, id.clone()))
            .cloned())
    }

    async fn fetch_recent_messages(
        &self,
        _room_id: &RoomId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, FetchError> {
        self.recent_calls.lock().unwrap().push(since);
        if let Some(e) = self.recent_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.recent.lock().unwrap().clone())
    }

    async fn subscribe_to_room(&self, _room_id: &RoomId) -> Result<FeedStream, FetchError> {
        Ok(stream::pending().boxed())
    }

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, FetchError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().unwrap().get(id).cloned())
    }

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message, FetchError> {
        self.sent.lock().unwrap().push(outgoing.clone());
        if self.send_fails.load(Ordering::SeqCst) {
            return Err(FetchError::Transient("send rejected".into()));
        }
        let mut confirmed = outgoing.to_optimistic(Utc::now());
        confirmed.id = MessageId::new(format!("srv-{}", self.sent.lock().unwrap().len()));
        Ok(confirmed)
    }
}

#[derive(Default)]
pub struct MockStorage {
    pub missing: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn resolve(&self, key: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.lock().unwrap().iter().any(|k| k == key) {
            return Err(FetchError::NotFound(key.to_string()));
        }
        Ok(format!("https://cdn.test/{key}"))
    }
}

/// Action sheet that answers with a scripted choice.
pub struct ScriptedSheet {
    pub choice: Mutex<Result<usize, ()>>,
    pub presented: Mutex<Vec<(Vec<String>, usize)>>,
}

impl ScriptedSheet {
    pub fn choosing(index: usize) -> Self {
        Self {
            choice: Mutex::new(Ok(index)),
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn dismissed() -> Self {
        Self {
            choice: Mutex::new(Err(())),
            presented: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ActionSheet for ScriptedSheet {
    async fn present(&self, options: &[&str], cancel_index: usize) -> Result<usize, ChatError> {
        self.presented.lock().unwrap().push((
            options.iter().map(|o| o.to_string()).collect(),
            cancel_index,
        ));
        let choice = *self.choice.lock().unwrap();
        choice.map_err(|_| ChatError::UserCancelled)
    }
}

#[derive(Default)]
pub struct MemoryClipboard {
    pub contents: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn write(&self, text: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("clipboard unavailable");
        }
        self.contents.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPicker {
    pub opened_for: Mutex<Vec<MessageId>>,
}

#[async_trait]
impl ReactionPicker for RecordingPicker {
    async fn open(&self, message: &Message) {
        self.opened_for.lock().unwrap().push(message.id.clone());
    }
}
