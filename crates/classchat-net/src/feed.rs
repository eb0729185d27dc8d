use serde::{Deserialize, Serialize};

use classchat_shared::{ChatError, Message};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedEventKind {
    Insert,
    Update,
}

/// One notification from the live-update feed.
///
/// Wire form: `{"type": "insert" | "update", "record": { ...message... }}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEvent {
    #[serde(rename = "type")]
    pub kind: FeedEventKind,
    pub record: Message,
}

impl FeedEvent {
    pub fn insert(record: Message) -> Self {
        Self {
            kind: FeedEventKind::Insert,
            record,
        }
    }

    pub fn update(record: Message) -> Self {
        Self {
            kind: FeedEventKind::Update,
            record,
        }
    }

    pub fn from_json(s: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }
}
