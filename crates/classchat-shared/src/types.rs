use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Backend-assigned user identifier.
    UserId
);
string_id!(
    /// Backend-assigned room identifier.
    RoomId
);
string_id!(
    /// Message identifier, unique within its room's message space.
    MessageId
);

/// Correlation token generated by the client for an optimistic send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ClientTempId(pub Uuid);

impl ClientTempId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Id under which the provisional entry is stored until it is confirmed.
    pub fn provisional_message_id(&self) -> MessageId {
        MessageId(format!("tmp:{}", self.0))
    }
}

impl Default for ClientTempId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientTempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub image_key: Option<String>,
    pub status: Option<String>,
}

/// The two kinds of room. Group and private messages live in disjoint
/// id spaces on the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoomVariant {
    Group,
    Private,
}

impl std::fmt::Display for RoomVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::Private => f.write_str("private"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Room {
    Group {
        id: RoomId,
        members: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    Private {
        id: RoomId,
        participant_ids: [UserId; 2],
    },
}

impl Room {
    pub fn id(&self) -> &RoomId {
        match self {
            Self::Group { id, .. } | Self::Private { id, .. } => id,
        }
    }

    pub fn variant(&self) -> RoomVariant {
        match self {
            Self::Group { .. } => RoomVariant::Group,
            Self::Private { .. } => RoomVariant::Private,
        }
    }

    pub fn has_member(&self, user: &UserId) -> bool {
        match self {
            Self::Group { members, .. } => members.contains(user),
            Self::Private {
                participant_ids, ..
            } => participant_ids.contains(user),
        }
    }
}

/// A chat message as delivered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: UserId,
    #[serde(default)]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub image_key: Option<String>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub audio_key: Option<String>,
    #[serde(default)]
    pub reply_to_message_id: Option<MessageId>,
    /// Echo of the sender's temp id on records that were sent optimistically.
    #[serde(default)]
    pub client_temp_id: Option<ClientTempId>,
}

impl Message {
    /// Display order key: `(created_at, id)`.
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }

    pub fn image_aspect_ratio(&self) -> Option<f32> {
        match (self.image_width, self.image_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(w as f32 / h as f32),
            _ => None,
        }
    }

    pub fn is_authored_by(&self, user: &UserId) -> bool {
        &self.author_id == user
    }

    /// Short clock time, e.g. `3:07 PM`.
    pub fn display_time(&self) -> String {
        self.created_at.format("%-I:%M %p").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub created_at: DateTime<Utc>,
    pub id: MessageId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Plain,
    Mention,
}

/// A span of message text with its highlight kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub kind: RunKind,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: RunKind::Plain,
        }
    }

    pub fn mention(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: RunKind::Mention,
        }
    }

    pub fn is_mention(&self) -> bool {
        self.kind == RunKind::Mention
    }
}
