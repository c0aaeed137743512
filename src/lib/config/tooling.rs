use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 2;
pub const DEFAULT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 6;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// Retry and deadline policy applied to every tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolingConfig {
    /// Total attempts per invocation, including the first one. Never zero.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
    /// Per-call response deadline.
    pub call_timeout: Duration,
    /// Deadline for connect + initialize + first catalogue listing.
    pub handshake_timeout: Duration,
}

impl Default for ToolingConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct RawToolingConfig {
    attempts: Option<u32>,
    delay_ms: Option<u64>,
    call_timeout_secs: Option<u64>,
    handshake_timeout_secs: Option<u64>,
}

impl From<RawToolingConfig> for ToolingConfig {
    fn from(raw: RawToolingConfig) -> Self {
        Self {
            attempts: raw.attempts.unwrap_or(DEFAULT_ATTEMPTS).max(1),
            delay: Duration::from_millis(raw.delay_ms.unwrap_or(DEFAULT_DELAY_MS)),
            call_timeout: Duration::from_secs(
                raw.call_timeout_secs.unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
            ),
            handshake_timeout: Duration::from_secs(
                raw.handshake_timeout_secs
                    .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            ),
        }
    }
}
