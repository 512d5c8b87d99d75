//! Test doubles for the message service and the push channel.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::config::CoreConfig;
use crate::context::SessionContext;
use crate::events::Publisher;
use crate::error::ChatError;
use crate::models::{
    ConversationSummary, Identity, Message, ParticipantPair, Payload, Role, Timestamp,
};
use crate::runtime::ChatSession;
use crate::store::ChatState;
use crate::service::{ImageUpload, MessageService};
use crate::streaming::{
    ChannelEvent, ClientEvent, PushChannel, ReceiveImage, ReceiveMessage, ServerEvent,
};

pub const ME: &str = "buyer@example.com";

/// A `MessageService` answering from scripted data. History calls can be held
/// open with a gate; any operation can be made to fail.
#[derive(Default)]
pub struct ScriptedService {
    pub inbox: RefCell<Vec<ConversationSummary>>,
    pub histories: RefCell<HashMap<String, Vec<Message>>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
    pub fail_inbox: Cell<bool>,
    pub fail_history: Cell<bool>,
    pub fail_mark_read: Cell<bool>,
    /// Peers whose mark-as-read fails regardless of `fail_mark_read`.
    pub fail_mark_read_for: RefCell<HashSet<String>>,
    pub fail_upload: Cell<bool>,
    pub fail_delete: Cell<bool>,
    pub mark_read_calls: RefCell<Vec<ParticipantPair>>,
    pub delete_calls: RefCell<Vec<(String, String)>>,
    pub uploads: RefCell<Vec<ImageUpload>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbox(self, entries: Vec<ConversationSummary>) -> Self {
        *self.inbox.borrow_mut() = entries;
        self
    }

    pub fn with_history(self, peer: &str, messages: Vec<Message>) -> Self {
        self.histories.borrow_mut().insert(peer.to_string(), messages);
        self
    }

    /// Hold the next history fetch for `peer` until the returned sender fires.
    pub fn gate_history(&self, peer: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(peer.to_string(), rx);
        tx
    }

    fn fail(&self, flag: &Cell<bool>, operation: &'static str) -> Result<(), ChatError> {
        if flag.get() {
            Err(ChatError::network(operation, "scripted failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl MessageService for Rc<ScriptedService> {
    async fn inbox(&self, _identity: &Identity) -> Result<Vec<ConversationSummary>, ChatError> {
        self.fail(&self.fail_inbox, "inbox")?;
        Ok(self.inbox.borrow().clone())
    }

    async fn history(&self, _user1: &str, user2: &str) -> Result<Vec<Message>, ChatError> {
        let gate = self.gates.borrow_mut().remove(user2);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.fail(&self.fail_history, "history")?;
        Ok(self
            .histories
            .borrow()
            .get(user2)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_as_read(&self, pair: &ParticipantPair) -> Result<(), ChatError> {
        self.mark_read_calls.borrow_mut().push(pair.clone());
        if self.fail_mark_read_for.borrow().contains(&pair.seller_email) {
            return Err(ChatError::network("mark as read", "scripted failure"));
        }
        self.fail(&self.fail_mark_read, "mark as read")
    }

    async fn upload_image(&self, upload: &ImageUpload) -> Result<String, ChatError> {
        self.uploads.borrow_mut().push(upload.clone());
        self.fail(&self.fail_upload, "upload image")?;
        Ok(format!("https://cdn.example.com/{}", upload.file_name))
    }

    async fn delete_conversation(&self, user1: &str, user2: &str) -> Result<(), ChatError> {
        self.delete_calls
            .borrow_mut()
            .push((user1.to_string(), user2.to_string()));
        self.fail(&self.fail_delete, "delete conversation")
    }
}

/// A push channel that records what was emitted.
#[derive(Default)]
pub struct RecordingChannel {
    pub emitted: RefCell<Vec<ClientEvent>>,
    pub fail: Cell<bool>,
}

impl RecordingChannel {
    pub fn sent_texts(&self) -> Vec<String> {
        self.emitted
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::SendMessage(send) => Some(send.text.clone()),
                ClientEvent::JoinChat(_) => None,
            })
            .collect()
    }

    pub fn joins(&self) -> usize {
        self.emitted
            .borrow()
            .iter()
            .filter(|event| matches!(event, ClientEvent::JoinChat(_)))
            .count()
    }
}

impl PushChannel for Rc<RecordingChannel> {
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        if self.fail.get() {
            return Err(ChatError::network("emit", "scripted failure"));
        }
        self.emitted.borrow_mut().push(event);
        Ok(())
    }
}

pub fn summary(peer: &str, unread: u32, timestamp: Timestamp) -> ConversationSummary {
    ConversationSummary {
        peer_email: peer.to_string(),
        peer_name: None,
        last_message: Some(format!("hello from {}", peer)),
        last_message_from: Some(peer.to_string()),
        unread_count: unread,
        timestamp,
    }
}

pub fn text(from: &str, to: &str, body: &str, timestamp: Timestamp) -> Message {
    Message::delivered(from, to, Payload::Text(body.to_string()), timestamp)
}

pub type TestSession = ChatSession<Rc<ScriptedService>, Rc<RecordingChannel>>;

/// A session for `ME` with a clock that the test controls.
pub fn session(
    service: ScriptedService,
) -> (
    TestSession,
    Rc<ScriptedService>,
    Rc<RecordingChannel>,
    Rc<Cell<Timestamp>>,
) {
    let service = Rc::new(service);
    let channel = Rc::new(RecordingChannel::default());
    let clock = Rc::new(Cell::new(1_000_000));
    let config = CoreConfig::new(ME, Role::Buyer);
    let now = clock.clone();
    let session = ChatSession::new(&config, service.clone(), channel.clone())
        .with_clock(move || now.get());
    (session, service, channel, clock)
}

pub fn push_text(from: &str, to: &str, body: &str, timestamp: Timestamp) -> ChannelEvent {
    ChannelEvent::Server(ServerEvent::ReceiveMessage(ReceiveMessage {
        from: from.to_string(),
        to: to.to_string(),
        text: body.to_string(),
        timestamp: Some(timestamp),
    }))
}

pub fn push_image(from: &str, to: &str, url: &str, timestamp: Timestamp) -> ChannelEvent {
    ChannelEvent::Server(ServerEvent::ReceiveImage(ReceiveImage {
        from: from.to_string(),
        to: to.to_string(),
        image_url: url.to_string(),
        timestamp: Some(timestamp),
    }))
}

pub type TestContext = SessionContext<Rc<ScriptedService>, Rc<RecordingChannel>>;

/// Bare coordinator context for `ME` with a fixed clock.
pub fn context(service: ScriptedService) -> (TestContext, Rc<ScriptedService>) {
    let service = Rc::new(service);
    let ctx = SessionContext {
        state: ChatState::shared(Identity::new(ME, Role::Buyer), 2_000),
        service: Rc::new(service.clone()),
        push: Rc::new(Rc::new(RecordingChannel::default())),
        publisher: Rc::new(Publisher::new()),
        clock: Rc::new(|| 5_000_i64),
    };
    (ctx, service)
}
