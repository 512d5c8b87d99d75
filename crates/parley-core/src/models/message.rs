use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use super::identity::normalize_address;
use super::timestamp::{deserialize_timestamp, Timestamp};
use crate::constants::{IMAGE_PLACEHOLDER, IMAGE_UNAVAILABLE};

/// Message body: plain text or a reference to an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    Image(String),
}

/// What a surface should render for an image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePreview {
    Remote(Url),
    /// The reference could not be resolved; render a placeholder instead.
    Placeholder,
}

impl Payload {
    /// One-line text used for conversation previews and the `lastMessage` column.
    pub fn preview(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Image(_) => match self.image_preview() {
                Some(ImagePreview::Remote(_)) => IMAGE_PLACEHOLDER.to_string(),
                _ => IMAGE_UNAVAILABLE.to_string(),
            },
        }
    }

    pub fn image_preview(&self) -> Option<ImagePreview> {
        match self {
            Payload::Text(_) => None,
            Payload::Image(reference) => Some(match Url::parse(reference) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => ImagePreview::Remote(url),
                _ => ImagePreview::Placeholder,
            }),
        }
    }
}

/// Client-local delivery state of an outbound message. Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

/// Client-local identifier of an optimistic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub payload: Payload,
    pub timestamp: Timestamp,
    pub delivery: DeliveryState,
    /// Set only for messages created on this client.
    pub local_id: Option<LocalId>,
}

impl Message {
    /// A message that already exists on the server (history or push).
    pub fn delivered(from: &str, to: &str, payload: Payload, timestamp: Timestamp) -> Self {
        Self {
            from: normalize_address(from),
            to: normalize_address(to),
            payload,
            timestamp,
            delivery: DeliveryState::Sent,
            local_id: None,
        }
    }

    /// A message created locally, not yet confirmed by the server.
    pub fn optimistic(from: &str, to: &str, payload: Payload, timestamp: Timestamp) -> Self {
        Self {
            from: normalize_address(from),
            to: normalize_address(to),
            payload,
            timestamp,
            delivery: DeliveryState::Pending,
            local_id: Some(LocalId::new()),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local_id.is_some()
    }

    /// Same sender, recipient and body. Timestamps are not compared.
    pub fn same_content(&self, other: &Message) -> bool {
        self.from == other.from && self.to == other.to && self.payload == other.payload
    }

    /// Stable fingerprint of a server-side message, used to drop replays.
    pub fn fingerprint(&self) -> String {
        self.digest(Some(self.timestamp))
    }

    /// Fingerprint without the timestamp, for events the server did not stamp.
    pub fn content_fingerprint(&self) -> String {
        self.digest(None)
    }

    fn digest(&self, timestamp: Option<Timestamp>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.from.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.to.as_bytes());
        hasher.update([0u8]);
        match &self.payload {
            Payload::Text(text) => {
                hasher.update(b"t");
                hasher.update(text.as_bytes());
            }
            Payload::Image(url) => {
                hasher.update(b"i");
                hasher.update(url.as_bytes());
            }
        }
        if let Some(timestamp) = timestamp {
            hasher.update([0u8]);
            hasher.update(timestamp.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Message as returned by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Timestamp,
}

impl WireMessage {
    /// Returns `None` when the record carries neither text nor an image.
    pub fn into_message(self) -> Option<Message> {
        let payload = match (self.image_url, self.text) {
            (Some(url), _) if !url.trim().is_empty() => Payload::Image(url),
            (_, Some(text)) => Payload::Text(text),
            _ => return None,
        };
        Some(Message::delivered(&self.from, &self.to, payload, self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_preview_falls_back_to_placeholder() {
        let ok = Payload::Image("https://cdn.example.com/a.png".to_string());
        let broken = Payload::Image("not a url".to_string());
        let local = Payload::Image("file:///tmp/a.png".to_string());

        assert!(matches!(ok.image_preview(), Some(ImagePreview::Remote(_))));
        assert_eq!(broken.image_preview(), Some(ImagePreview::Placeholder));
        assert_eq!(local.image_preview(), Some(ImagePreview::Placeholder));
        assert_eq!(ok.preview(), IMAGE_PLACEHOLDER);
        assert_eq!(broken.preview(), IMAGE_UNAVAILABLE);
        assert_eq!(Payload::Text("hey".into()).image_preview(), None);
    }

    #[test]
    fn test_local_message_serializes_its_id() {
        let message = Message::optimistic("a@x", "b@x", Payload::Text("hi".into()), 1);
        let value = serde_json::to_value(&message).unwrap();
        let local_id = message.local_id.unwrap().to_string();
        assert_eq!(value["local_id"], local_id.as_str());
        assert_eq!(value["delivery"], "pending");
    }

    #[test]
    fn test_fingerprint_distinguishes_timestamp_and_kind() {
        let a = Message::delivered("a@x", "b@x", Payload::Text("hi".into()), 1);
        let b = Message::delivered("a@x", "b@x", Payload::Text("hi".into()), 2);
        let c = Message::delivered("a@x", "b@x", Payload::Image("hi".into()), 1);
        let a_again = Message::delivered("A@x", "b@x", Payload::Text("hi".into()), 1);

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), a_again.fingerprint());
        assert_eq!(a.content_fingerprint(), b.content_fingerprint());
        assert_ne!(a.content_fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_wire_message_conversion() {
        let json = r#"[
            {"from": "a@x", "to": "b@x", "text": "hello", "timestamp": 10},
            {"from": "b@x", "to": "a@x", "imageUrl": "https://x/y.png", "timestamp": "1970-01-01T00:00:00.020Z"},
            {"from": "b@x", "to": "a@x", "timestamp": 30}
        ]"#;
        let wire: Vec<WireMessage> = serde_json::from_str(json).unwrap();
        let messages: Vec<Message> = wire.into_iter().filter_map(WireMessage::into_message).collect();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, Payload::Text("hello".into()));
        assert_eq!(messages[1].payload, Payload::Image("https://x/y.png".into()));
        assert_eq!(messages[1].timestamp, 20);
        assert!(messages.iter().all(|m| m.delivery == DeliveryState::Sent && !m.is_local()));
    }
}
