use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use classchat_net::MessageBackend;
use classchat_shared::{FetchError, Message, MessageId, Room, RoomId, RoomVariant};

use super::cache::{CacheStats, CoalescingCache, Resolution};

/// Process-wide reply caches, one per message id space.
///
/// Entries hold the raw lookup result, so rooms of the same variant share
/// them and reopening a room never refetches a resolved reply.
#[derive(Clone)]
pub struct ReplyCaches {
    group: CoalescingCache<MessageId, Option<Message>>,
    private: CoalescingCache<MessageId, Option<Message>>,
}

impl ReplyCaches {
    pub fn new(timeout: Duration) -> Self {
        Self {
            group: CoalescingCache::new("reply.group", timeout),
            private: CoalescingCache::new("reply.private", timeout),
        }
    }

    pub fn for_variant(&self, variant: RoomVariant) -> CoalescingCache<MessageId, Option<Message>> {
        match variant {
            RoomVariant::Group => self.group.clone(),
            RoomVariant::Private => self.private.clone(),
        }
    }
}

/// Resolves reply references of one room to the replied-to record.
///
/// The room variant picks the backend lookup (group and private messages
/// live in separate id spaces). A target that does not exist or belongs to
/// another room resolves to `None`.
pub struct ReplyResolver {
    room_id: RoomId,
    variant: RoomVariant,
    backend: Arc<dyn MessageBackend>,
    cache: CoalescingCache<MessageId, Option<Message>>,
}

impl ReplyResolver {
    /// Resolver with a private cache.
    pub fn new(room: &Room, backend: Arc<dyn MessageBackend>, timeout: Duration) -> Self {
        Self::with_caches(room, backend, &ReplyCaches::new(timeout))
    }

    /// Resolver backed by the shared cache for the room's variant.
    pub fn with_caches(room: &Room, backend: Arc<dyn MessageBackend>, caches: &ReplyCaches) -> Self {
        Self {
            room_id: room.id().clone(),
            variant: room.variant(),
            backend,
            cache: caches.for_variant(room.variant()),
        }
    }

    pub fn variant(&self) -> RoomVariant {
        self.variant
    }

    pub async fn resolve(&self, id: &MessageId) -> Result<Option<Message>, FetchError> {
        let backend = self.backend.clone();
        let variant = self.variant;
        let target = id.clone();

        let found = self
            .cache
            .get_or_fetch(id.clone(), move || async move {
                match backend.fetch_message(variant, &target).await {
                    Err(FetchError::NotFound(_)) => Ok(None),
                    other => other,
                }
            })
            .await?;
        Ok(self.same_room(id, found))
    }

    /// Resolve the reply target of `message`, `Ok(None)` if it has none.
    pub async fn resolve_for(&self, message: &Message) -> Result<Option<Message>, FetchError> {
        match &message.reply_to_message_id {
            Some(id) => self.resolve(id).await,
            None => Ok(None),
        }
    }

    pub fn peek(&self, id: &MessageId) -> Option<Resolution<Option<Message>>> {
        match self.cache.peek(id)? {
            Resolution::Value(found) => Some(Resolution::Value(self.same_room(id, found))),
            other => Some(other),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn same_room(&self, id: &MessageId, found: Option<Message>) -> Option<Message> {
        match found {
            Some(m) if m.room_id == self.room_id => Some(m),
            Some(m) => {
                debug!(
                    msg_id = %id,
                    room = %self.room_id,
                    other_room = %m.room_id,
                    "Cross-room reply reference"
                );
                None
            }
            None => None,
        }
    }
}
