//! Client configuration loaded from environment variables.
//!
//! Built once at startup and handed to collaborators behind an `Arc`; no
//! component reads the environment on its own.

use std::time::Duration;

use classchat_net::ReconnectPolicy;
use classchat_shared::constants::DEFAULT_RESOLVE_TIMEOUT_MS;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str =
    "classchat_client=debug,classchat_net=debug,classchat_store=info,warn";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Upper bound for one reply / attachment / user lookup.
    /// Env: `CLASSCHAT_RESOLVE_TIMEOUT_MS`
    /// Default: `10000`
    pub resolve_timeout: Duration,

    /// Upper bound for the initial page fetch when a room is opened.
    /// Env: `CLASSCHAT_INITIAL_LOAD_TIMEOUT_MS`
    /// Default: `15000`
    pub initial_load_timeout: Duration,

    /// Feed reconnect schedule.
    /// Env: `CLASSCHAT_RECONNECT_INITIAL_MS`, `CLASSCHAT_RECONNECT_MAX_MS`,
    /// `CLASSCHAT_RECONNECT_ALERT_AFTER`, `CLASSCHAT_RECONNECT_JITTER` (true/false)
    pub reconnect: ReconnectPolicy,

    /// Filter used when `RUST_LOG` is not set.
    /// Env: `CLASSCHAT_LOG`
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            initial_load_timeout: Duration::from_millis(15_000),
            reconnect: ReconnectPolicy::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "CLASSCHAT_RESOLVE_TIMEOUT_MS") {
            config.resolve_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CLASSCHAT_INITIAL_LOAD_TIMEOUT_MS") {
            config.initial_load_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CLASSCHAT_RECONNECT_INITIAL_MS") {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "CLASSCHAT_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }

        if let Some(n) = parse_var::<u32>(&lookup, "CLASSCHAT_RECONNECT_ALERT_AFTER") {
            config.reconnect.alert_after = n;
        }

        if let Some(val) = lookup("CLASSCHAT_RECONNECT_JITTER") {
            config.reconnect.jitter = val != "false" && val != "0";
        }

        if let Some(filter) = lookup("CLASSCHAT_LOG") {
            if !filter.is_empty() {
                config.log_filter = filter;
            }
        }

        if config.reconnect.max_delay < config.reconnect.initial_delay {
            tracing::warn!(
                initial_ms = config.reconnect.initial_delay.as_millis() as u64,
                max_ms = config.reconnect.max_delay.as_millis() as u64,
                "Reconnect cap below initial delay, raising cap"
            );
            config.reconnect.max_delay = config.reconnect.initial_delay;
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}
