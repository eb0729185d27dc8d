//! Per-message enrichment: reply previews, media URIs, author profiles and
//! mention highlighting layered on top of a raw [`Message`].
//!
//! Enrichment never blocks the list. A rendered view first gets a synchronous
//! projection built from whatever the resolver caches already hold, then a
//! background task fills in the rest and publishes the final projection.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use classchat_shared::{mention, FetchError, Message, TextRun, User};

use crate::resolver::{AttachmentResolver, ReplyResolver, Resolution, UserResolver};

/// State of one optional enrichment of a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum Enrichment<T> {
    /// The message has nothing to resolve here.
    Absent,
    Pending,
    Ready(T),
    /// Lookup failed or the target does not exist. Render without it.
    Unavailable,
}

impl<T> Enrichment<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    fn from_peek(peek: Option<Resolution<T>>) -> Self {
        match peek {
            None | Some(Resolution::Pending) => Self::Pending,
            Some(Resolution::Value(value)) => Self::Ready(value),
            Some(Resolution::Failed(_)) => Self::Unavailable,
        }
    }

    fn from_result(result: Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(_) => Self::Unavailable,
        }
    }
}

impl<T> Enrichment<Option<T>> {
    /// Collapse a resolved `None` into `Unavailable`.
    fn flatten(self) -> Enrichment<T> {
        match self {
            Self::Absent => Enrichment::Absent,
            Self::Pending => Enrichment::Pending,
            Self::Ready(Some(value)) => Enrichment::Ready(value),
            Self::Ready(None) | Self::Unavailable => Enrichment::Unavailable,
        }
    }
}

/// Read-only view model of one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMessage {
    pub message: Message,
    pub author: Enrichment<User>,
    pub author_avatar_uri: Enrichment<String>,
    pub reply: Enrichment<Message>,
    pub image_uri: Enrichment<String>,
    pub audio_uri: Enrichment<String>,
    pub highlighted_runs: Vec<TextRun>,
    pub is_own: bool,
}

impl ResolvedMessage {
    pub fn resolved_reply(&self) -> Option<&Message> {
        self.reply.ready()
    }

    pub fn resolved_image_uri(&self) -> Option<&str> {
        self.image_uri.ready().map(String::as_str)
    }

    pub fn resolved_audio_uri(&self) -> Option<&str> {
        self.audio_uri.ready().map(String::as_str)
    }

    /// Reply referenced but not resolvable; shown as "reply unavailable".
    pub fn reply_unavailable(&self) -> bool {
        matches!(self.reply, Enrichment::Unavailable)
    }

    pub fn has_pending(&self) -> bool {
        self.author.is_pending()
            || self.author_avatar_uri.is_pending()
            || self.reply.is_pending()
            || self.image_uri.is_pending()
            || self.audio_uri.is_pending()
    }
}

/// Builds [`ResolvedMessage`]s for one room.
pub struct MessageEnricher {
    replies: Arc<ReplyResolver>,
    attachments: Arc<AttachmentResolver>,
    users: Arc<UserResolver>,
    self_user: User,
    highlight_mentions: bool,
}

impl MessageEnricher {
    pub fn new(
        replies: Arc<ReplyResolver>,
        attachments: Arc<AttachmentResolver>,
        users: Arc<UserResolver>,
        self_user: User,
        highlight_mentions: bool,
    ) -> Self {
        Self {
            replies,
            attachments,
            users,
            self_user,
            highlight_mentions,
        }
    }

    /// Projection from cached state only. Never starts a fetch.
    pub fn project(&self, message: &Message) -> ResolvedMessage {
        let reply = match &message.reply_to_message_id {
            Some(id) => Enrichment::from_peek(self.replies.peek(id)).flatten(),
            None => Enrichment::Absent,
        };
        let image_uri = match &message.image_key {
            Some(key) => Enrichment::from_peek(self.attachments.peek(key)),
            None => Enrichment::Absent,
        };
        let audio_uri = match &message.audio_key {
            Some(key) => Enrichment::from_peek(self.attachments.peek(key)),
            None => Enrichment::Absent,
        };
        let author = Enrichment::from_peek(self.users.peek(&message.author_id)).flatten();
        let author_avatar_uri = match &author {
            Enrichment::Ready(User {
                image_key: Some(key),
                ..
            }) => Enrichment::from_peek(self.attachments.peek(key)),
            Enrichment::Ready(_) | Enrichment::Absent => Enrichment::Absent,
            Enrichment::Pending => Enrichment::Pending,
            Enrichment::Unavailable => Enrichment::Unavailable,
        };

        self.assemble(message, author, author_avatar_uri, reply, image_uri, audio_uri)
    }

    /// Resolve everything the message references. Failures degrade the
    /// affected field to `Unavailable`; the rest of the message is kept.
    pub async fn enrich(&self, message: &Message) -> ResolvedMessage {
        let reply = async {
            match &message.reply_to_message_id {
                Some(id) => Enrichment::from_result(self.replies.resolve(id).await).flatten(),
                None => Enrichment::Absent,
            }
        };
        let image = async {
            match &message.image_key {
                Some(key) => Enrichment::from_result(self.attachments.resolve_image(key).await),
                None => Enrichment::Absent,
            }
        };
        let audio = async {
            match &message.audio_key {
                Some(key) => Enrichment::from_result(self.attachments.resolve_audio(key).await),
                None => Enrichment::Absent,
            }
        };
        let author = async {
            let author = Enrichment::from_result(self.users.resolve(&message.author_id).await)
                .flatten();
            let avatar = match author.ready() {
                Some(user) => match self.attachments.resolve_avatar(user).await {
                    Ok(Some(uri)) => Enrichment::Ready(uri),
                    Ok(None) => Enrichment::Absent,
                    Err(_) => Enrichment::Unavailable,
                },
                None => Enrichment::Unavailable,
            };
            (author, avatar)
        };

        let (reply, image_uri, audio_uri, (author, author_avatar_uri)) =
            futures::join!(reply, image, audio, author);

        if matches!(reply, Enrichment::Unavailable) {
            debug!(msg_id = %message.id, "Reply preview unavailable");
        }

        self.assemble(message, author, author_avatar_uri, reply, image_uri, audio_uri)
    }

    fn assemble(
        &self,
        message: &Message,
        author: Enrichment<User>,
        author_avatar_uri: Enrichment<String>,
        reply: Enrichment<Message>,
        image_uri: Enrichment<String>,
        audio_uri: Enrichment<String>,
    ) -> ResolvedMessage {
        ResolvedMessage {
            message: message.clone(),
            author,
            author_avatar_uri,
            reply,
            image_uri,
            audio_uri,
            highlighted_runs: self.highlight(&message.content),
            is_own: message.is_authored_by(&self.self_user.id),
        }
    }

    fn highlight(&self, content: &str) -> Vec<TextRun> {
        if self.highlight_mentions {
            mention::tag(content, &self.self_user.name)
        } else if content.is_empty() {
            Vec::new()
        } else {
            vec![TextRun::plain(content)]
        }
    }
}

/// A rendered message: the latest projection plus the background task that
/// keeps it up to date. Dropping it cancels the view-side work; resolver
/// fetches already in flight still complete into the shared caches.
pub struct MountedMessage {
    view: watch::Receiver<ResolvedMessage>,
    task: JoinHandle<()>,
}

impl MountedMessage {
    pub fn spawn(enricher: Arc<MessageEnricher>, message: Message) -> Self {
        let (tx, view) = watch::channel(enricher.project(&message));
        let task = tokio::spawn(async move {
            let resolved = enricher.enrich(&message).await;
            tx.send_if_modified(|current| {
                if *current == resolved {
                    return false;
                }
                *current = resolved;
                true
            });
        });
        Self { view, task }
    }

    pub fn current(&self) -> ResolvedMessage {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ResolvedMessage> {
        self.view.clone()
    }

    /// Wait until background enrichment is done and return the result.
    pub async fn settled(&mut self) -> ResolvedMessage {
        while self.view.changed().await.is_ok() {}
        self.view.borrow().clone()
    }
}

impl Drop for MountedMessage {
    fn drop(&mut self) {
        self.task.abort();
    }
}
