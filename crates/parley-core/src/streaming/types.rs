use serde::{Deserialize, Serialize};

use crate::models::timestamp::deserialize_optional_timestamp;
use crate::models::{Message, ParticipantPair, Payload, Timestamp};

/// Server → client push events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ReceiveMessage(ReceiveMessage),
    ReceiveImage(ReceiveImage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessage {
    pub from: String,
    pub to: String,
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveImage {
    pub from: String,
    pub to: String,
    pub image_url: String,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub timestamp: Option<Timestamp>,
}

impl ServerEvent {
    /// Whether the server stamped the event.
    pub fn is_stamped(&self) -> bool {
        match self {
            ServerEvent::ReceiveMessage(event) => event.timestamp.is_some(),
            ServerEvent::ReceiveImage(event) => event.timestamp.is_some(),
        }
    }

    /// Normalize either event kind into a `Message`. Events without a
    /// timestamp are stamped with the arrival time.
    pub fn into_message(self, received_at: Timestamp) -> Message {
        match self {
            ServerEvent::ReceiveMessage(event) => Message::delivered(
                &event.from,
                &event.to,
                Payload::Text(event.text),
                event.timestamp.unwrap_or(received_at),
            ),
            ServerEvent::ReceiveImage(event) => Message::delivered(
                &event.from,
                &event.to,
                Payload::Image(event.image_url),
                event.timestamp.unwrap_or(received_at),
            ),
        }
    }
}

/// Client → server push events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinChat(ParticipantPair),
    SendMessage(SendMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub buyer_email: String,
    pub seller_email: String,
    pub text: String,
    pub sender: String,
}

impl SendMessage {
    pub fn new(pair: ParticipantPair, text: &str, sender: &str) -> Self {
        Self {
            buyer_email: pair.buyer_email,
            seller_email: pair.seller_email,
            text: text.to_string(),
            sender: sender.to_string(),
        }
    }
}

/// What the push transport reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    /// The connection dropped. `unsent` holds frames the transport accepted
    /// but could not write.
    Disconnected { unsent: Vec<ClientEvent> },
    Server(ServerEvent),
}
