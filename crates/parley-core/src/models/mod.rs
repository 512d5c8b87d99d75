pub mod conversation;
pub mod identity;
pub mod message;
pub mod timestamp;

pub use conversation::{Conversation, ConversationSummary};
pub use identity::{normalize_address, Identity, ParticipantPair, Role};
pub use message::{DeliveryState, ImagePreview, LocalId, Message, Payload, WireMessage};
pub use timestamp::{now_ms, parse_timestamp, Timestamp};
