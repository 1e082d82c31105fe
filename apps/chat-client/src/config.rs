use std::time::Duration;

use crate::session::dedupe::DEFAULT_DEDUPE_WINDOW;
use crate::session::options::{
    DEFAULT_APP_PATH, DEFAULT_RECONNECT_DELAY, DEFAULT_SCHEME,
};
use crate::session::{ConnectParams, SessionOptions};

/// Chat client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity announced to the server.
    pub user_id: String,
    /// Room to join.
    pub room: String,
    pub host: String,
    pub port: u16,
    /// Only `ws` is supported.
    pub scheme: String,
    pub app_path: String,
    pub reconnect_delay: Duration,
    pub dedupe_window: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            user_id: required_var("CHAT_USER_ID"),
            room: required_var("CHAT_ROOM"),
            host: std::env::var("CHAT_HOST")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "localhost".to_string()),
            port: std::env::var("CHAT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9091),
            scheme: std::env::var("CHAT_SCHEME")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
            app_path: std::env::var("CHAT_APP_PATH")
                .ok()
                .unwrap_or_else(|| DEFAULT_APP_PATH.to_string()),
            reconnect_delay: std::env::var("CHAT_RECONNECT_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_DELAY),
            dedupe_window: std::env::var("CHAT_DEDUPE_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DEDUPE_WINDOW),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default()
            .with_scheme(&self.scheme)
            .with_app_path(&self.app_path)
            .with_reconnect_delay(self.reconnect_delay)
            .with_dedupe_window(self.dedupe_window)
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams::new(&self.user_id, &self.room, &self.host, self.port)
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
