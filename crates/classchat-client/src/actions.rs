//! Long-press action menu for rendered messages.
//!
//! ```text
//! Idle -> MenuOpen -> {Copy, Reply, React, Cancel} -> Idle
//! ```
//!
//! Which actions a room offers comes from a static capability table keyed
//! by [`RoomVariant`]. The UI surfaces (action sheet, clipboard, composer,
//! reaction picker) are collaborators behind traits.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use classchat_shared::{ActionError, ChatError, Message, MessageId, RoomVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Copy,
    Reply,
    React,
    Cancel,
}

/// Per-variant menu layout and rendering flags.
#[derive(Debug, PartialEq, Eq)]
pub struct RoomCapabilities {
    pub actions: &'static [MessageAction],
    /// Sheet labels, index-aligned with `actions`.
    pub labels: &'static [&'static str],
    pub highlight_mentions: bool,
}

impl RoomCapabilities {
    /// Cancel is always the last option.
    pub fn cancel_index(&self) -> usize {
        self.actions.len() - 1
    }

    pub fn action_at(&self, index: usize) -> Option<MessageAction> {
        self.actions.get(index).copied()
    }

    pub fn allows(&self, action: MessageAction) -> bool {
        self.actions.contains(&action)
    }
}

static GROUP_CAPABILITIES: RoomCapabilities = RoomCapabilities {
    actions: &[MessageAction::Copy, MessageAction::Reply, MessageAction::Cancel],
    labels: &["Copy Text", "Reply", "Cancel"],
    highlight_mentions: true,
};

static PRIVATE_CAPABILITIES: RoomCapabilities = RoomCapabilities {
    actions: &[
        MessageAction::Copy,
        MessageAction::Reply,
        MessageAction::React,
        MessageAction::Cancel,
    ],
    labels: &["Copy", "Reply", "React", "Cancel"],
    highlight_mentions: false,
};

pub fn capabilities(variant: RoomVariant) -> &'static RoomCapabilities {
    match variant {
        RoomVariant::Group => &GROUP_CAPABILITIES,
        RoomVariant::Private => &PRIVATE_CAPABILITIES,
    }
}

/// Modal option picker. Dismissal is reported as [`ChatError::UserCancelled`].
#[async_trait]
pub trait ActionSheet: Send + Sync {
    async fn present(&self, options: &[&str], cancel_index: usize) -> Result<usize, ChatError>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write(&self, text: &str) -> anyhow::Result<()>;
}

/// The message composer's reply slot.
pub trait Composer: Send + Sync {
    fn set_reply_target(&self, id: MessageId);
    fn take_reply_target(&self) -> Option<MessageId>;
    fn reply_target(&self) -> Option<MessageId>;
}

#[async_trait]
pub trait ReactionPicker: Send + Sync {
    async fn open(&self, message: &Message);
}

/// In-memory [`Composer`] owned by a room session.
#[derive(Debug, Default)]
pub struct ComposerState {
    reply_target: Mutex<Option<MessageId>>,
}

impl ComposerState {
    fn slot(&self) -> MutexGuard<'_, Option<MessageId>> {
        self.reply_target.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Composer for ComposerState {
    fn set_reply_target(&self, id: MessageId) {
        *self.slot() = Some(id);
    }

    fn take_reply_target(&self) -> Option<MessageId> {
        self.slot().take()
    }

    fn reply_target(&self) -> Option<MessageId> {
        self.slot().clone()
    }
}

#[derive(Clone)]
pub struct ActionCollaborators {
    pub sheet: Arc<dyn ActionSheet>,
    pub clipboard: Arc<dyn Clipboard>,
    pub composer: Arc<dyn Composer>,
    pub picker: Arc<dyn ReactionPicker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    MenuOpen,
    Performing(MessageAction),
}

/// Pure transition table of the menu, free of any I/O.
#[derive(Debug)]
pub struct ActionMenu {
    capabilities: &'static RoomCapabilities,
    state: ActionState,
}

impl ActionMenu {
    pub fn new(variant: RoomVariant) -> Self {
        Self {
            capabilities: capabilities(variant),
            state: ActionState::Idle,
        }
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn capabilities(&self) -> &'static RoomCapabilities {
        self.capabilities
    }

    pub fn open(&mut self) -> Result<&'static RoomCapabilities, ActionError> {
        if self.state != ActionState::Idle {
            return Err(ActionError::MenuAlreadyOpen);
        }
        self.state = ActionState::MenuOpen;
        Ok(self.capabilities)
    }

    /// `None` (dismissed) and unknown indices both select Cancel.
    pub fn select(&mut self, index: Option<usize>) -> Result<MessageAction, ActionError> {
        if self.state != ActionState::MenuOpen {
            return Err(ActionError::MenuNotOpen);
        }
        let action = index
            .and_then(|i| self.capabilities.action_at(i))
            .unwrap_or(MessageAction::Cancel);
        self.state = ActionState::Performing(action);
        Ok(action)
    }

    pub fn finish(&mut self) {
        self.state = ActionState::Idle;
    }
}

/// What a long-press ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Copied,
    /// Copy on a message without text.
    CopySkipped,
    CopyFailed(String),
    ReplyTargetSet(MessageId),
    ReactionPickerOpened,
    Cancelled,
}

/// Action menu bound to one rendered message.
pub struct ActionDispatcher {
    message: Message,
    menu: Mutex<ActionMenu>,
    collaborators: ActionCollaborators,
}

/// Returns the menu to `Idle` on every exit path, including a dropped future.
struct MenuReset<'a>(&'a Mutex<ActionMenu>);

impl Drop for MenuReset<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).finish();
    }
}

impl ActionDispatcher {
    pub fn new(message: Message, variant: RoomVariant, collaborators: ActionCollaborators) -> Self {
        Self {
            message,
            menu: Mutex::new(ActionMenu::new(variant)),
            collaborators,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn state(&self) -> ActionState {
        self.menu().state()
    }

    pub fn capabilities(&self) -> &'static RoomCapabilities {
        self.menu().capabilities()
    }

    /// Present the menu and carry out the chosen action.
    ///
    /// Fails with [`ActionError::MenuAlreadyOpen`] while a previous sheet
    /// for this message is still up.
    pub async fn long_press(&self) -> Result<ActionOutcome, ChatError> {
        let caps = self.menu().open()?;
        let _reset = MenuReset(&self.menu);

        let choice = match self
            .collaborators
            .sheet
            .present(caps.labels, caps.cancel_index())
            .await
        {
            Ok(index) => Some(index),
            Err(ChatError::UserCancelled) => None,
            Err(e) => return Err(e),
        };

        let action = self.menu().select(choice)?;
        debug!(msg_id = %self.message.id, action = ?action, "Message action selected");
        Ok(self.perform(action).await)
    }

    async fn perform(&self, action: MessageAction) -> ActionOutcome {
        match action {
            MessageAction::Copy => {
                if self.message.content.is_empty() {
                    return ActionOutcome::CopySkipped;
                }
                match self.collaborators.clipboard.write(&self.message.content).await {
                    Ok(()) => ActionOutcome::Copied,
                    Err(e) => {
                        warn!(msg_id = %self.message.id, error = %e, "Clipboard write failed");
                        ActionOutcome::CopyFailed(e.to_string())
                    }
                }
            }
            MessageAction::Reply => {
                self.collaborators
                    .composer
                    .set_reply_target(self.message.id.clone());
                ActionOutcome::ReplyTargetSet(self.message.id.clone())
            }
            MessageAction::React => {
                self.collaborators.picker.open(&self.message).await;
                ActionOutcome::ReactionPickerOpened
            }
            MessageAction::Cancel => ActionOutcome::Cancelled,
        }
    }

    fn menu(&self) -> MutexGuard<'_, ActionMenu> {
        self.menu.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
