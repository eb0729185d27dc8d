//! # classchat-store
//!
//! In-memory, per-room message cache for the Classchat client.
//!
//! A [`MessageStore`] is the single source of truth for what a room view
//! renders: it deduplicates by message id, keeps entries in `(created_at, id)`
//! order no matter how they arrive, reconciles optimistic sends with their
//! confirmed records, and broadcasts a [`StoreChange`] for every structural
//! change.

pub mod messages;

mod error;

pub use error::StoreError;
pub use messages::{InsertOutcome, MessageStore, StoreChange};
