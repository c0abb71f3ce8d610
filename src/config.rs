//! Session configuration.
//!
//! Resolution order for each setting:
//! 1. Explicit value set on [`SessionConfig`]
//! 2. Environment variable (via [`SessionConfig::from_env`])
//! 3. Built-in default

use std::time::Duration;

use tracing::warn;

use crate::rpc::framing::MAX_MESSAGE_SIZE;

/// Environment variable overriding the call timeout. `0` disables it.
pub const TIMEOUT_ENV: &str = "NVIM_ATTACH_TIMEOUT_SECS";

/// Environment variable overriding the maximum message size.
pub const MAX_MESSAGE_ENV: &str = "NVIM_ATTACH_MAX_MESSAGE_BYTES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline applied by `Session::call`. `None`, the default, waits
    /// forever, since some remote calls block on the user.
    pub call_timeout: Option<Duration>,
    /// Largest incoming message the dispatch loop will buffer.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `NVIM_ATTACH_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().apply(
            std::env::var(TIMEOUT_ENV).ok().as_deref(),
            std::env::var(MAX_MESSAGE_ENV).ok().as_deref(),
        )
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    fn apply(mut self, timeout: Option<&str>, max_message: Option<&str>) -> Self {
        if let Some(raw) = timeout {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.call_timeout = None,
                Ok(secs) => self.call_timeout = Some(Duration::from_secs(secs)),
                Err(_) => warn!("Ignoring invalid {}={}", TIMEOUT_ENV, raw),
            }
        }
        if let Some(raw) = max_message {
            match raw.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => self.max_message_size = bytes,
                _ => warn!("Ignoring invalid {}={}", MAX_MESSAGE_ENV, raw),
            }
        }
        self
    }
}
