use std::time::Duration;

use thiserror::Error;

use crate::types::RoomId;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    /// Whether this failure should reach the user as a visible error state.
    /// Everything else degrades the affected message silently.
    pub fn is_user_visible(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_user_visible(),
            Self::Fetch(_) | Self::Action(_) | Self::UserCancelled | Self::Serialization(_) => {
                false
            }
        }
    }
}

/// Failure of a single backend or object-storage lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Reply or attachment target absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or backend failure. Retried on next access.
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("A subscription for room {0} is already open")]
    AlreadyOpen(RoomId),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Reconnect to room {room_id} failed {attempts} times in a row")]
    ReconnectFailing { room_id: RoomId, attempts: u32 },

    #[error("Room {0} is unavailable")]
    RoomUnavailable(RoomId),
}

impl ChannelError {
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::ReconnectFailing { .. } | Self::RoomUnavailable(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Action menu is already open")]
    MenuAlreadyOpen,

    #[error("No action menu is open")]
    MenuNotOpen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_room_level_failures_are_user_visible() {
        let room = RoomId::from("g1");
        assert!(ChatError::from(ChannelError::RoomUnavailable(room.clone())).is_user_visible());
        assert!(ChatError::from(ChannelError::ReconnectFailing {
            room_id: room.clone(),
            attempts: 5
        })
        .is_user_visible());

        assert!(!ChatError::from(ChannelError::ConnectionLost("reset".into())).is_user_visible());
        assert!(!ChatError::from(FetchError::NotFound("m1".into())).is_user_visible());
        assert!(!ChatError::from(FetchError::Transient("503".into())).is_user_visible());
        assert!(!ChatError::UserCancelled.is_user_visible());
    }
}
