//! Collaborator interfaces consumed by the pipeline.
//!
//! The message/graph API and the object store are external services; the
//! client only sees them through these object-safe async traits so tests and
//! alternative transports can be plugged in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use classchat_shared::{
    ChannelError, ClientTempId, FetchError, Message, MessageId, RoomId, RoomVariant, User, UserId,
};

use crate::feed::FeedEvent;

/// Live-update feed for one room. An `Err` item or the end of the stream
/// means the connection is gone.
pub type FeedStream = BoxStream<'static, Result<FeedEvent, ChannelError>>;

#[async_trait]
pub trait MessageBackend: Send + Sync {
    /// Look up a single message in the group or private message space.
    /// `Ok(None)` when no such message exists.
    async fn fetch_message(
        &self,
        variant: RoomVariant,
        id: &MessageId,
    ) -> Result<Option<Message>, FetchError>;

    /// Messages of `room_id` created after `since` (all recent ones when
    /// `None`), oldest first.
    async fn fetch_recent_messages(
        &self,
        room_id: &RoomId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, FetchError>;

    /// Open the live insert/update feed. Delivery is at-least-once while
    /// the stream is alive and not guaranteed across reconnects.
    async fn subscribe_to_room(&self, room_id: &RoomId) -> Result<FeedStream, FetchError>;

    async fn fetch_user(&self, id: &UserId) -> Result<Option<User>, FetchError>;

    /// Create a message. The returned record echoes `client_temp_id`.
    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message, FetchError>;
}

/// Blob storage that turns opaque keys into fetchable URIs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<String, FetchError>;
}

/// A message as submitted by the local user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub room_id: RoomId,
    pub variant: RoomVariant,
    pub author_id: UserId,
    pub content: String,
    pub client_temp_id: ClientTempId,
    pub image_key: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub audio_key: Option<String>,
    pub reply_to_message_id: Option<MessageId>,
}

impl OutgoingMessage {
    /// The provisional record rendered until the backend confirms.
    pub fn to_optimistic(&self, created_at: DateTime<Utc>) -> Message {
        Message {
            id: self.client_temp_id.provisional_message_id(),
            room_id: self.room_id.clone(),
            author_id: self.author_id.clone(),
            content: self.content.clone(),
            created_at,
            image_key: self.image_key.clone(),
            image_width: self.image_width,
            image_height: self.image_height,
            audio_key: self.audio_key.clone(),
            reply_to_message_id: self.reply_to_message_id.clone(),
            client_temp_id: Some(self.client_temp_id.clone()),
        }
    }
}
