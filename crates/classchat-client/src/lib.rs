//! # classchat-client
//!
//! The message enrichment pipeline of the Classchat client: resolver caches
//! for replies, attachments and authors, per-message enrichment, the
//! long-press action menu and the room session that ties them to the store
//! and the live feed.

pub mod actions;
pub mod config;
pub mod enrich;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod testing;

pub use actions::{
    capabilities, ActionCollaborators, ActionDispatcher, ActionMenu, ActionOutcome, ActionSheet,
    ActionState, Clipboard, Composer, ComposerState, MessageAction, ReactionPicker,
    RoomCapabilities,
};
pub use config::ClientConfig;
pub use enrich::{Enrichment, MessageEnricher, MountedMessage, ResolvedMessage};
pub use resolver::{AttachmentResolver, MediaKind, ReplyCaches, ReplyResolver, UserResolver};
pub use session::{ClientContext, Draft, ImageAttachment, RoomSession, UiCollaborators};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.log_filter`. Fails if a subscriber is
/// already installed.
pub fn init_logging(config: &ClientConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!(app = classchat_shared::constants::APP_NAME, "Logging initialised");
    Ok(())
}
