use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ImageUpload, MessageService};
use crate::constants::paths;
use crate::error::ChatError;
use crate::models::{ConversationSummary, Identity, Message, ParticipantPair, WireMessage};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    image_url: String,
}

/// REST adapter for the message service.
pub struct HttpMessageService {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpMessageService {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ChatError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ChatError::Config(format!("invalid service url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::Config(format!(
                "service url cannot be a base: {}",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            auth_token,
        })
    }

    fn endpoint(&self, path: &[&str], params: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path).extend(params);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, ChatError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Status { status, body })
    }
}

#[async_trait(?Send)]
impl MessageService for HttpMessageService {
    async fn inbox(&self, identity: &Identity) -> Result<Vec<ConversationSummary>, ChatError> {
        let url = self.endpoint(paths::INBOX, &[identity.role.as_str(), &identity.email]);
        debug!(%url, "Fetching inbox");
        let response = self.authorize(self.client.get(url)).send().await?;
        let body = Self::check(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn history(&self, user1: &str, user2: &str) -> Result<Vec<Message>, ChatError> {
        let url = self.endpoint(paths::HISTORY, &[user1, user2]);
        debug!(%url, "Fetching history");
        let response = self.authorize(self.client.get(url)).send().await?;
        let body = Self::check(response).await?.text().await?;
        let wire: Vec<WireMessage> = serde_json::from_str(&body)?;
        let total = wire.len();
        let messages: Vec<Message> = wire.into_iter().filter_map(WireMessage::into_message).collect();
        if messages.len() != total {
            warn!(
                skipped = total - messages.len(),
                "History contained messages without text or image"
            );
        }
        Ok(messages)
    }

    async fn mark_as_read(&self, pair: &ParticipantPair) -> Result<(), ChatError> {
        let url = self.endpoint(paths::MARK_AS_READ, &[]);
        let response = self
            .authorize(self.client.post(url))
            .json(pair)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ChatError> {
        let url = self.endpoint(paths::UPLOAD_IMAGE, &[]);
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)?;
        let form = Form::new()
            .text("fromEmail", upload.from.clone())
            .text("toEmail", upload.to.clone())
            .part("image", part);
        let response = self
            .authorize(self.client.post(url))
            .multipart(form)
            .send()
            .await?;
        let body = Self::check(response).await?.text().await?;
        let parsed: UploadResponse = serde_json::from_str(&body)?;
        Ok(parsed.image_url)
    }

    async fn delete_conversation(&self, user1: &str, user2: &str) -> Result<(), ChatError> {
        let url = self.endpoint(paths::CONVERSATION, &[user1, user2]);
        let response = self.authorize(self.client.delete(url)).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Payload, Role};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_encodes_segments() {
        let service = HttpMessageService::new("http://host:3000/base/", None).unwrap();
        let url = service.endpoint(paths::HISTORY, &["a b@x.com", "s/1@x.com"]);
        assert_eq!(
            url.as_str(),
            "http://host:3000/base/api/chat/history/a%20b@x.com/s%2F1@x.com"
        );
        assert!(HttpMessageService::new("not a url", None).is_err());
    }

    #[tokio::test]
    async fn test_inbox_is_role_scoped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/inbox/seller/shop@x.com"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"peerEmail": "b@x.com", "peerName": "B", "lastMessage": "hi",
                 "lastMessageFrom": "b@x.com", "unreadCount": 3, "timestamp": 10}
            ])))
            .mount(&server)
            .await;

        let service = HttpMessageService::new(&server.uri(), Some("token".into())).unwrap();
        let inbox = service
            .inbox(&Identity::new("shop@x.com", Role::Seller))
            .await
            .unwrap();

        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].unread_count, 3);
    }

    #[tokio::test]
    async fn test_history_and_mark_as_read() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/history/b@x.com/s@x.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"from": "b@x.com", "to": "s@x.com", "text": "one", "timestamp": 1},
                {"from": "s@x.com", "to": "b@x.com", "imageUrl": "https://cdn/p.png", "timestamp": 2}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/mark-as-read"))
            .and(body_json(json!({"buyerEmail": "b@x.com", "sellerEmail": "s@x.com"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpMessageService::new(&server.uri(), None).unwrap();
        let history = service.history("b@x.com", "s@x.com").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].payload, Payload::Image("https://cdn/p.png".into()));

        let pair = Identity::new("b@x.com", Role::Buyer).pair_with("s@x.com");
        service.mark_as_read(&pair).await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/chat/conversation/b@x.com/s@x.com"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/upload-image"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"imageUrl": "https://cdn/u.png"})),
            )
            .mount(&server)
            .await;

        let service = HttpMessageService::new(&server.uri(), None).unwrap();
        match service.delete_conversation("b@x.com", "s@x.com").await {
            Err(ChatError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let url = service
            .upload_image(&ImageUpload {
                from: "b@x.com".into(),
                to: "s@x.com".into(),
                file_name: "p.png".into(),
                mime_type: "image/png".into(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap();
        assert_eq!(url, "https://cdn/u.png");
    }
}
