use thiserror::Error;

use classchat_shared::RoomId;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record belongs to a different room than this store.
    #[error("Message for room {found} inserted into store for room {expected}")]
    WrongRoom { expected: RoomId, found: RoomId },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
