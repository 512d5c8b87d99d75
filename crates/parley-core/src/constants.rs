//! Application-wide constants
//!
//! Centralized location for tuning values and endpoint paths that are used
//! across multiple modules.

/// Window within which a push event matching a just-sent message is treated
/// as the server echo of that message.
pub const ECHO_WINDOW_MS: i64 = 2_000;

/// How long an emitted frame stays claimable by a disconnect that hands it back unsent.
pub const IN_TRANSIT_RETENTION_MS: i64 = 60_000;

/// Floor for the inbox poll interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;

/// Number of applied push-message fingerprints remembered for replay detection.
pub const APPLIED_LOG_CAPACITY: usize = 512;

/// Default interval between inbox polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Delay before the push socket attempts to reconnect.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 2;

/// Capacity of the inbound push event channel.
pub const PUSH_EVENT_BUFFER: usize = 256;

// Preview text for image payloads
pub const IMAGE_PLACEHOLDER: &str = "[image]";
pub const IMAGE_UNAVAILABLE: &str = "[image unavailable]";

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:3000";
pub const DEFAULT_PUSH_ADDRESS: &str = "127.0.0.1:3001";

// REST paths, relative to the service base URL
pub mod paths {
    pub const INBOX: &[&str] = &["api", "chat", "inbox"];
    pub const HISTORY: &[&str] = &["api", "chat", "history"];
    pub const MARK_AS_READ: &[&str] = &["api", "chat", "mark-as-read"];
    pub const UPLOAD_IMAGE: &[&str] = &["api", "chat", "upload-image"];
    pub const CONVERSATION: &[&str] = &["api", "chat", "conversation"];
}
