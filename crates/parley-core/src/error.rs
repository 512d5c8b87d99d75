use thiserror::Error;

/// Input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Message text is empty")]
    EmptyText,
    #[error("No conversation is open")]
    NoActivePeer,
    #[error("Image is empty")]
    EmptyImage,
    #[error("Message {0} is not in a failed state")]
    NotRetryable(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{operation} failed: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Push channel is disconnected")]
    ChannelDisconnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No conversation with {0}")]
    UnknownConversation(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),
}

impl ChatError {
    pub fn network(operation: &'static str, message: impl Into<String>) -> Self {
        ChatError::Network {
            operation,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_))
    }
}
