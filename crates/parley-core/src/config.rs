use std::time::Duration;

use crate::constants::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PUSH_ADDRESS, DEFAULT_RECONNECT_DELAY_SECS,
    DEFAULT_SERVICE_URL, ECHO_WINDOW_MS, MIN_POLL_INTERVAL_MS,
};
use crate::models::{Identity, Role};

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Base URL of the message service REST API.
    pub service_url: String,
    /// `host:port` of the push channel socket.
    pub push_address: String,
    pub identity: Identity,
    pub auth_token: Option<String>,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub echo_window_ms: i64,
}

impl CoreConfig {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            push_address: DEFAULT_PUSH_ADDRESS.to_string(),
            identity: Identity::new(email, role),
            auth_token: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            echo_window_ms: ECHO_WINDOW_MS,
        }
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    pub fn with_push_address(mut self, address: impl Into<String>) -> Self {
        self.push_address = address.into();
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Intervals below one second are raised to one second.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}
