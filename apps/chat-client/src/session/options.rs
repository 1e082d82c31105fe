use std::time::Duration;

use super::dedupe::DEFAULT_DEDUPE_WINDOW;

/// Fixed delay between an involuntary close and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_SCHEME: &str = "ws";
pub const DEFAULT_APP_PATH: &str = "chatapp";

/// Tunables for a chat session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Only `ws` is supported.
    pub scheme: String,
    /// Path prefix in front of `/chatrooms/<room>`.
    pub app_path: String,
    pub reconnect_delay: Duration,
    /// How many accepted event ids are remembered for duplicate detection.
    pub dedupe_window: usize,
}

impl SessionOptions {
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_app_path(mut self, app_path: impl Into<String>) -> Self {
        self.app_path = app_path.into();
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_dedupe_window(mut self, window: usize) -> Self {
        self.dedupe_window = window;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            app_path: DEFAULT_APP_PATH.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }
}
