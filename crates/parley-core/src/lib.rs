pub mod bridge;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod receipts;
pub mod runtime;
pub mod sender;
pub mod service;
pub mod store;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{BridgeOutcome, EventBridge};
pub use config::CoreConfig;
pub use error::{ChatError, ValidationError};
pub use events::{ChatSnapshot, Notice, NoticeKind, Operation};
pub use history::HistoryOutcome;
pub use runtime::{ChatRuntime, ChatSession};
pub use service::{HttpMessageService, MessageService};
pub use streaming::{PushChannel, PushHandle, SocketPushClient};
