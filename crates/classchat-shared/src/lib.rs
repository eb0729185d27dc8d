//! # classchat-shared
//!
//! Data model, error taxonomy and pure helpers shared by every Classchat
//! crate. Nothing in here performs I/O.

pub mod constants;
pub mod error;
pub mod mention;
pub mod types;

pub use error::{ActionError, ChannelError, ChatError, FetchError};
pub use types::*;
