//! Lazy, memoized enrichment lookups.
//!
//! All resolvers sit on top of [`cache::CoalescingCache`]: one in-flight
//! fetch per key, permanent memoization of successes, no memoization of
//! failures.

pub mod attachment;
pub mod cache;
pub mod reply;
pub mod user;

pub use attachment::{AttachmentResolver, MediaKind};
pub use cache::{CacheStats, CoalescingCache, Resolution};
pub use reply::{ReplyCaches, ReplyResolver};
pub use user::UserResolver;
