use std::fmt;

use tokio::sync::{broadcast, watch};

use crate::models::{Conversation, Message};

/// Operations that can surface a notice to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LoadInbox,
    LoadHistory,
    MarkAsRead,
    Delete,
    Send,
    UploadImage,
    Channel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::LoadInbox => "load inbox",
            Operation::LoadHistory => "load history",
            Operation::MarkAsRead => "mark as read",
            Operation::Delete => "delete conversation",
            Operation::Send => "send message",
            Operation::UploadImage => "upload image",
            Operation::Channel => "push channel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// A request did not complete; local state was rolled back where needed.
    NetworkFailure,
    /// The push channel dropped; reconnecting.
    ChannelDisconnect,
    /// Input rejected before any network call.
    Validation,
}

/// User-visible notice. State may be stale, nothing is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub operation: Operation,
    pub message: String,
}

impl Notice {
    pub fn network(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::NetworkFailure,
            operation,
            message: message.into(),
        }
    }

    pub fn validation(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Validation,
            operation,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::ChannelDisconnect,
            operation: Operation::Channel,
            message: message.into(),
        }
    }
}

/// Everything a presentation surface needs to render: the inbox, the derived
/// badge and the open thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub conversations: Vec<Conversation>,
    pub total_unread: u32,
    pub open_peer: Option<String>,
    pub thread: Vec<Message>,
    pub connected: bool,
}

/// Fan-out to subscribed surfaces (nav badge, chat modal, inbox, store page).
pub struct Publisher {
    snapshot_tx: watch::Sender<ChatSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl Publisher {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());
        let (notice_tx, _) = broadcast::channel(64);
        Self {
            snapshot_tx,
            notice_tx,
        }
    }

    pub fn publish(&self, snapshot: ChatSnapshot) {
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    pub fn notify(&self, notice: Notice) {
        tracing::warn!(operation = %notice.operation, "{}", notice.message);
        // No subscribers is fine; the notice is still logged.
        let _ = self.notice_tx.send(notice);
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn latest(&self) -> ChatSnapshot {
        self.snapshot_tx.borrow().clone()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}
