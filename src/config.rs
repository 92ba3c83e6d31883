//! Kernel configuration.
//!
//! All settings can be configured via environment variables:
//! - `MOVE_COALESCE_WINDOW_MS`: Debounce window for position-only updates (default: 1000)
//! - `HISTORY_DEFAULT_LIMIT`: Page size when a history query names none (default: 50)
//! - `HISTORY_MAX_LIMIT`: Largest accepted page size (default: 100)

use std::time::Duration;

/// Default coalescing window for position-only updates.
pub const DEFAULT_MOVE_WINDOW_MS: u64 = 1000;
/// Default history page size.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Largest history page size.
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Pagination bounds for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Page size used when the caller names none.
    pub default_limit: u32,
    /// Largest accepted page size.
    pub max_limit: u32,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_HISTORY_LIMIT,
            max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

/// Runtime configuration shared by the kernel services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// How long a node must stay still before its move is written.
    pub move_window: Duration,
    /// History pagination bounds.
    pub history: HistoryLimits,
}

impl KernelConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let window_ms = env_parse("MOVE_COALESCE_WINDOW_MS").unwrap_or(DEFAULT_MOVE_WINDOW_MS);
        let max_limit = env_parse("HISTORY_MAX_LIMIT").unwrap_or(MAX_HISTORY_LIMIT).max(1);
        let default_limit = env_parse("HISTORY_DEFAULT_LIMIT")
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, max_limit);

        Self {
            move_window: Duration::from_millis(window_ms),
            history: HistoryLimits {
                default_limit,
                max_limit,
            },
        }
    }

    /// Override the coalescing window.
    pub fn with_move_window(mut self, window: Duration) -> Self {
        self.move_window = window;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            move_window: Duration::from_millis(DEFAULT_MOVE_WINDOW_MS),
            history: HistoryLimits::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
