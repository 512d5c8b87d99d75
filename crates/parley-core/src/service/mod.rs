//! Message service contract (REST side).
//!
//! Persistence, authentication and the server itself live elsewhere; this
//! module only describes what the client consumes.

pub mod http;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::{ConversationSummary, Identity, Message, ParticipantPair};

pub use http::HttpMessageService;

/// Image to upload before an image message is appended.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub from: String,
    pub to: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait(?Send)]
pub trait MessageService {
    /// Role-scoped inbox, most recent first.
    async fn inbox(&self, identity: &Identity) -> Result<Vec<ConversationSummary>, ChatError>;

    /// Ordered history between two users.
    async fn history(&self, user1: &str, user2: &str) -> Result<Vec<Message>, ChatError>;

    /// Idempotent.
    async fn mark_as_read(&self, pair: &ParticipantPair) -> Result<(), ChatError>;

    /// Returns the URL of the stored image.
    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ChatError>;

    async fn delete_conversation(&self, user1: &str, user2: &str) -> Result<(), ChatError>;
}
