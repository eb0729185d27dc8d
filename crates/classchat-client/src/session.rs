//! Client context and per-room sessions.
//!
//! The [`ClientContext`] holds everything shared across rooms for the life of
//! the process: configuration, backend handles, the attachment, user and
//! reply caches, and the subscription registry. A [`RoomSession`] wires one
//! room's store, feed, reply resolver and composer together for as long as
//! the room is on screen.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use classchat_net::{
    ChannelStatus, MessageBackend, ObjectStorage, OutgoingMessage, SubscriptionChannel,
    SubscriptionHandle,
};
use classchat_shared::{ChannelError, ChatError, ClientTempId, Message, Room, User};
use classchat_store::{MessageStore, StoreChange};

use crate::actions::{
    capabilities, ActionCollaborators, ActionDispatcher, ActionSheet, Clipboard, Composer,
    ComposerState, ReactionPicker,
};
use crate::config::ClientConfig;
use crate::enrich::{MessageEnricher, MountedMessage, ResolvedMessage};
use crate::resolver::{AttachmentResolver, ReplyCaches, ReplyResolver, UserResolver};

/// Process-wide state shared by all room sessions.
pub struct ClientContext {
    pub config: Arc<ClientConfig>,
    pub backend: Arc<dyn MessageBackend>,
    pub attachments: Arc<AttachmentResolver>,
    pub users: Arc<UserResolver>,
    /// Reply caches shared by every session, one per room variant.
    pub replies: ReplyCaches,
    pub channel: SubscriptionChannel,
    /// The signed-in user.
    pub self_user: User,
}

impl ClientContext {
    pub fn new(
        config: Arc<ClientConfig>,
        backend: Arc<dyn MessageBackend>,
        storage: Arc<dyn ObjectStorage>,
        self_user: User,
    ) -> Self {
        let attachments = Arc::new(AttachmentResolver::new(storage, config.resolve_timeout));
        let users = Arc::new(UserResolver::new(backend.clone(), config.resolve_timeout));
        let replies = ReplyCaches::new(config.resolve_timeout);
        let channel = SubscriptionChannel::new(backend.clone(), config.reconnect.clone());
        Self {
            config,
            backend,
            attachments,
            users,
            replies,
            channel,
            self_user,
        }
    }
}

/// UI surfaces the action menu talks to.
#[derive(Clone)]
pub struct UiCollaborators {
    pub sheet: Arc<dyn ActionSheet>,
    pub clipboard: Arc<dyn Clipboard>,
    pub picker: Arc<dyn ReactionPicker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub key: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A message being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub content: String,
    pub image: Option<ImageAttachment>,
    pub audio_key: Option<String>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

pub struct RoomSession {
    room: Room,
    store: Arc<MessageStore>,
    subscription: SubscriptionHandle,
    backend: Arc<dyn MessageBackend>,
    replies: Arc<ReplyResolver>,
    enricher: Arc<MessageEnricher>,
    composer: Arc<ComposerState>,
    ui: UiCollaborators,
    self_user: User,
}

impl RoomSession {
    /// Subscribe to `room`, then load its initial page.
    ///
    /// The subscription goes first so nothing sent between the page fetch
    /// and the feed connect is missed; the store deduplicates the overlap.
    /// If the initial page cannot be loaded the subscription is closed and
    /// [`ChannelError::RoomUnavailable`] is returned.
    pub async fn open(
        ctx: &ClientContext,
        room: Room,
        ui: UiCollaborators,
    ) -> Result<Self, ChatError> {
        let room_id = room.id().clone();
        if !room.has_member(&ctx.self_user.id) {
            warn!(room = %room_id, user = %ctx.self_user.id, "Opening room without membership");
        }

        let store = Arc::new(MessageStore::new(room_id.clone()));
        let mut subscription = ctx.channel.open(store.clone())?;

        let page = tokio::time::timeout(
            ctx.config.initial_load_timeout,
            ctx.backend.fetch_recent_messages(&room_id, None),
        )
        .await;

        match page {
            Ok(Ok(records)) => {
                let changed = store.insert_page(records);
                info!(room = %room_id, messages = changed, "Initial page loaded");
            }
            Ok(Err(e)) => {
                error!(room = %room_id, error = %e, "Initial page fetch failed");
                subscription.close().await;
                return Err(ChannelError::RoomUnavailable(room_id).into());
            }
            Err(_) => {
                error!(
                    room = %room_id,
                    timeout_ms = ctx.config.initial_load_timeout.as_millis() as u64,
                    "Initial page fetch timed out"
                );
                subscription.close().await;
                return Err(ChannelError::RoomUnavailable(room_id).into());
            }
        }

        let replies = Arc::new(ReplyResolver::with_caches(
            &room,
            ctx.backend.clone(),
            &ctx.replies,
        ));
        let enricher = Arc::new(MessageEnricher::new(
            replies.clone(),
            ctx.attachments.clone(),
            ctx.users.clone(),
            ctx.self_user.clone(),
            capabilities(room.variant()).highlight_mentions,
        ));

        Ok(Self {
            room,
            store,
            subscription,
            backend: ctx.backend.clone(),
            replies,
            enricher,
            composer: Arc::new(ComposerState::default()),
            ui,
            self_user: ctx.self_user.clone(),
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Current messages in display order.
    pub fn messages(&self) -> Vec<Message> {
        self.store.all()
    }

    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    pub fn status(&self) -> ChannelStatus {
        self.subscription.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.subscription.watch_status()
    }

    pub fn replies(&self) -> &ReplyResolver {
        &self.replies
    }

    pub fn composer(&self) -> &dyn Composer {
        self.composer.as_ref()
    }

    /// Cache-only projection of `message`.
    pub fn project(&self, message: &Message) -> ResolvedMessage {
        self.enricher.project(message)
    }

    /// Start enriching `message` for a rendered view.
    pub fn mount(&self, message: Message) -> MountedMessage {
        MountedMessage::spawn(self.enricher.clone(), message)
    }

    pub fn dispatcher(&self, message: Message) -> ActionDispatcher {
        ActionDispatcher::new(
            message,
            self.room.variant(),
            ActionCollaborators {
                sheet: self.ui.sheet.clone(),
                clipboard: self.ui.clipboard.clone(),
                composer: self.composer.clone(),
                picker: self.ui.picker.clone(),
            },
        )
    }

    pub async fn send_text(&self, content: impl Into<String>) -> Result<Message, ChatError> {
        self.send(Draft::text(content)).await
    }

    /// Send `draft`, replying to the composer's current target if any.
    ///
    /// The message is visible immediately as a provisional entry. On success
    /// it is replaced by the confirmed record; on failure it is removed and
    /// the reply target is restored.
    pub async fn send(&self, draft: Draft) -> Result<Message, ChatError> {
        let reply_to = self.composer.take_reply_target();
        let temp_id = ClientTempId::new();
        let (image_key, image_width, image_height) = match draft.image {
            Some(image) => (Some(image.key), image.width, image.height),
            None => (None, None, None),
        };
        let outgoing = OutgoingMessage {
            room_id: self.room.id().clone(),
            variant: self.room.variant(),
            author_id: self.self_user.id.clone(),
            content: draft.content,
            client_temp_id: temp_id.clone(),
            image_key,
            image_width,
            image_height,
            audio_key: draft.audio_key,
            reply_to_message_id: reply_to.clone(),
        };

        if let Err(e) = self
            .store
            .insert_optimistic(outgoing.to_optimistic(Utc::now()), temp_id.clone())
        {
            warn!(room = %self.room.id(), error = %e, "Optimistic insert rejected");
        }

        match self.backend.send_message(&outgoing).await {
            Ok(mut confirmed) => {
                if confirmed.client_temp_id.is_none() {
                    confirmed.client_temp_id = Some(temp_id);
                }
                if let Err(e) = self.store.insert(confirmed.clone()) {
                    warn!(room = %self.room.id(), error = %e, "Confirmed record rejected");
                }
                info!(room = %self.room.id(), msg_id = %confirmed.id, "Message sent");
                Ok(confirmed)
            }
            Err(e) => {
                warn!(room = %self.room.id(), temp_id = %temp_id, error = %e, "Send failed");
                self.store.discard_optimistic(&temp_id);
                if let Some(id) = reply_to {
                    self.composer.set_reply_target(id);
                }
                Err(e.into())
            }
        }
    }

    /// Stop the live feed. The store keeps its contents.
    pub async fn close(&mut self) {
        self.subscription.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use classchat_shared::{FetchError, MessageId, RoomId, RoomVariant, UserId};

    use crate::actions::ActionOutcome;
    use crate::testing::{
        msg, user, MemoryClipboard, MockBackend, MockStorage, RecordingPicker, ScriptedSheet,
    };

    fn context(backend: &Arc<MockBackend>) -> ClientContext {
        let config = ClientConfig {
            initial_load_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        ClientContext::new(
            Arc::new(config),
            backend.clone(),
            Arc::new(MockStorage::default()),
            user("bob", "bob"),
        )
    }

    fn ui(choice: usize) -> UiCollaborators {
        UiCollaborators {
            sheet: Arc::new(ScriptedSheet::choosing(choice)),
            clipboard: Arc::new(MemoryClipboard::default()),
            picker: Arc::new(RecordingPicker::default()),
        }
    }

    fn group() -> Room {
        Room::Group {
            id: RoomId::from("g1"),
            members: vec![UserId::from("alice"), UserId::from("bob")],
        }
    }

    #[tokio::test]
    async fn test_open_loads_initial_page_in_order() {
        let backend = Arc::new(MockBackend::default());
        *backend.recent.lock().unwrap() = vec![msg("g1", "b", 20), msg("g1", "a", 10)];
        let ctx = context(&backend);

        let mut session = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();
        let ids: Vec<_> = session.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId::from("a"), MessageId::from("b")]);
        assert_eq!(*backend.recent_calls.lock().unwrap(), vec![None]);
        assert!(ctx.channel.is_open(&RoomId::from("g1")));

        session.close().await;
        assert!(!ctx.channel.is_open(&RoomId::from("g1")));
    }

    #[tokio::test]
    async fn test_second_session_for_same_room_is_rejected() {
        let backend = Arc::new(MockBackend::default());
        let ctx = context(&backend);

        let _first = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();
        let second = RoomSession::open(&ctx, group(), ui(0)).await;
        assert!(matches!(
            second,
            Err(ChatError::Channel(ChannelError::AlreadyOpen(_)))
        ));
    }

    #[tokio::test]
    async fn test_initial_page_failure_closes_subscription() {
        let backend = Arc::new(MockBackend::default());
        *backend.recent_error.lock().unwrap() = Some(FetchError::Transient("503".into()));
        let ctx = context(&backend);

        let err = match RoomSession::open(&ctx, group(), ui(0)).await {
            Err(e) => e,
            Ok(_) => panic!("open should fail"),
        };
        assert!(err.is_user_visible());
        assert!(matches!(
            err,
            ChatError::Channel(ChannelError::RoomUnavailable(_))
        ));
        assert!(!ctx.channel.is_open(&RoomId::from("g1")));
    }

    #[tokio::test]
    async fn test_send_replaces_provisional_entry() {
        let backend = Arc::new(MockBackend::default());
        let ctx = context(&backend);
        let session = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();
        let mut changes = session.changes();

        let sent = session.send_text("hello class").await.unwrap();

        let all = session.messages();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, sent.id);
        assert_eq!(all[0].content, "hello class");

        assert!(matches!(changes.recv().await.unwrap(), StoreChange::Inserted(_)));
        assert!(matches!(
            changes.recv().await.unwrap(),
            StoreChange::Confirmed { id, .. } if id == sent.id
        ));
    }

    #[tokio::test]
    async fn test_failed_send_discards_and_restores_reply_target() {
        let backend = Arc::new(MockBackend::default());
        *backend.recent.lock().unwrap() = vec![msg("g1", "m1", 10)];
        backend.send_fails.store(true, Ordering::SeqCst);
        let ctx = context(&backend);
        let session = RoomSession::open(&ctx, group(), ui(1)).await.unwrap();

        let target = session.messages()[0].clone();
        let outcome = session.dispatcher(target).long_press().await.unwrap();
        assert_eq!(outcome, ActionOutcome::ReplyTargetSet(MessageId::from("m1")));

        assert!(session.send_text("replying").await.is_err());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.composer().reply_target(), Some(MessageId::from("m1")));

        let sent = backend.sent.lock().unwrap();
        assert_eq!(sent[0].reply_to_message_id, Some(MessageId::from("m1")));
        assert_eq!(sent[0].variant, RoomVariant::Group);
    }

    #[tokio::test]
    async fn test_send_consumes_reply_target() {
        let backend = Arc::new(MockBackend::default());
        *backend.recent.lock().unwrap() = vec![msg("g1", "m1", 10)];
        let ctx = context(&backend);
        let session = RoomSession::open(&ctx, group(), ui(1)).await.unwrap();

        session.composer().set_reply_target(MessageId::from("m1"));
        let sent = session.send_text("answer").await.unwrap();
        assert_eq!(sent.reply_to_message_id, Some(MessageId::from("m1")));
        assert_eq!(session.composer().reply_target(), None);
    }

    #[tokio::test]
    async fn test_mounted_message_resolves_reply() {
        let backend = Arc::new(MockBackend::default());
        let parent = msg("g1", "m1", 10);
        let mut child = msg("g1", "m2", 20);
        child.reply_to_message_id = Some(parent.id.clone());
        backend.add_message(RoomVariant::Group, parent.clone());
        *backend.recent.lock().unwrap() = vec![parent, child.clone()];
        let ctx = context(&backend);
        let session = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();

        let mut mounted = session.mount(child);
        let resolved = mounted.settled().await;
        assert_eq!(resolved.resolved_reply().unwrap().id, MessageId::from("m1"));
        assert_eq!(session.replies().stats().fetches, 1);
    }

    #[tokio::test]
    async fn test_reopened_room_reuses_reply_cache() {
        let backend = Arc::new(MockBackend::default());
        let parent = msg("g1", "m1", 10);
        let mut child = msg("g1", "m2", 20);
        child.reply_to_message_id = Some(parent.id.clone());
        backend.add_message(RoomVariant::Group, parent.clone());
        *backend.recent.lock().unwrap() = vec![parent, child.clone()];
        let ctx = context(&backend);

        let mut session = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();
        session.mount(child.clone()).settled().await;
        session.close().await;
        drop(session);

        let reopened = RoomSession::open(&ctx, group(), ui(0)).await.unwrap();
        let projected = reopened.project(&child);
        assert_eq!(projected.resolved_reply().unwrap().id, MessageId::from("m1"));
        reopened.mount(child).settled().await;
        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 1);
    }
}
