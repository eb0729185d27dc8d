/// Application name
pub const APP_NAME: &str = "Classchat";

/// Prefix a token must carry to mention a user
pub const MENTION_PREFIX: char = '@';

/// Upper bound for a single reply / attachment / user lookup, in milliseconds
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 10_000;

/// First reconnect delay in milliseconds
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;

/// Reconnect delay cap in milliseconds
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Consecutive reconnect failures before the user is alerted
pub const DEFAULT_RECONNECT_ALERT_AFTER: u32 = 5;

/// Buffered store change notifications per subscriber
pub const STORE_CHANGE_CAPACITY: usize = 256;
