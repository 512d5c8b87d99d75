use serde::{Deserialize, Serialize};

use super::identity::normalize_address;
use super::message::Message;
use super::timestamp::{deserialize_timestamp, Timestamp};

/// One row of the inbox: a two-party conversation with `peer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub peer: String,
    pub peer_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_from: Option<String>,
    pub unread_count: u32,
    pub timestamp: Timestamp,
    /// Created locally for a first outbound message; the server does not know it yet.
    pub local_stub: bool,
}

impl Conversation {
    pub fn stub(peer: &str, peer_name: Option<String>, now: Timestamp) -> Self {
        Self {
            peer: normalize_address(peer),
            peer_name,
            last_message: None,
            last_message_from: None,
            unread_count: 0,
            timestamp: now,
            local_stub: true,
        }
    }

    /// Conversation first seen through a message (push event from an unknown peer).
    pub fn from_message(peer: &str, message: &Message) -> Self {
        let mut conversation = Self::stub(peer, None, message.timestamp);
        conversation.local_stub = false;
        conversation.apply_preview(message);
        conversation
    }

    pub(crate) fn apply_preview(&mut self, message: &Message) {
        self.last_message = Some(message.payload.preview());
        self.last_message_from = Some(message.from.clone());
        self.timestamp = message.timestamp;
    }
}

/// Inbox row as returned by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub peer_email: String,
    #[serde(default)]
    pub peer_name: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_from: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
}

impl From<ConversationSummary> for Conversation {
    fn from(summary: ConversationSummary) -> Self {
        Self {
            peer: normalize_address(&summary.peer_email),
            peer_name: summary.peer_name,
            last_message: summary.last_message,
            last_message_from: summary.last_message_from.map(|from| normalize_address(&from)),
            unread_count: summary.unread_count,
            timestamp: summary.timestamp,
            local_stub: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_parsing() {
        let json = r#"{
            "peerEmail": "Seller1@Shop.com",
            "peerName": "Seller One",
            "lastMessage": "see you",
            "lastMessageFrom": "seller1@shop.com",
            "unreadCount": 2,
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let summary: ConversationSummary = serde_json::from_str(json).unwrap();
        let conversation = Conversation::from(summary);

        assert_eq!(conversation.peer, "seller1@shop.com");
        assert_eq!(conversation.unread_count, 2);
        assert_eq!(conversation.timestamp, 1_704_067_200_000);
        assert!(!conversation.local_stub);
    }

    #[test]
    fn test_summary_defaults() {
        let summary: ConversationSummary =
            serde_json::from_str(r#"{"peerEmail": "x@y.z"}"#).unwrap();
        assert_eq!(summary.unread_count, 0);
        assert_eq!(summary.timestamp, 0);
        assert!(summary.last_message.is_none());
    }
}
