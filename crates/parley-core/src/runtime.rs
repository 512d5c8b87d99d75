use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bridge::{BridgeOutcome, EventBridge};
use crate::config::CoreConfig;
use crate::context::{Clock, SessionContext};
use crate::error::ChatError;
use crate::events::{ChatSnapshot, Notice, Operation, Publisher};
use crate::history::{HistoryLoader, HistoryOutcome};
use crate::lifecycle::ConversationLifecycleManager;
use crate::models::{
    normalize_address, now_ms, Conversation, DeliveryState, Identity, LocalId, Timestamp,
};
use crate::receipts::ReadReceiptCoordinator;
use crate::sender::MessageSender;
use crate::service::{HttpMessageService, MessageService};
use crate::store::{ChatState, OpState, SharedState};
use crate::streaming::{ChannelEvent, ClientEvent, PushChannel, PushHandle, SocketPushClient};

/// Everything one identity session needs: the stores, the coordinators that
/// mutate them and the publisher that surfaces the result.
pub struct ChatSession<S, P> {
    ctx: SessionContext<S, P>,
    echo_window_ms: i64,
    receipts: ReadReceiptCoordinator<S, P>,
    history: HistoryLoader<S, P>,
    lifecycle: ConversationLifecycleManager<S, P>,
    sender: MessageSender<S, P>,
    bridge: EventBridge<S, P>,
}

impl<S: MessageService, P: PushChannel> ChatSession<S, P> {
    pub fn new(config: &CoreConfig, service: S, push: P) -> Self {
        let ctx = SessionContext {
            state: ChatState::shared(config.identity.clone(), config.echo_window_ms),
            service: Rc::new(service),
            push: Rc::new(push),
            publisher: Rc::new(Publisher::new()),
            clock: Rc::new(now_ms),
        };
        Self::from_context(ctx, config.echo_window_ms)
    }

    /// Replace the wall clock, e.g. with a controllable one in tests.
    pub fn with_clock(self, clock: impl Fn() -> Timestamp + 'static) -> Self {
        let clock: Clock = Rc::new(clock);
        let ctx = SessionContext {
            clock,
            ..self.ctx.clone()
        };
        Self::from_context(ctx, self.echo_window_ms)
    }

    fn from_context(ctx: SessionContext<S, P>, echo_window_ms: i64) -> Self {
        Self {
            receipts: ReadReceiptCoordinator::new(ctx.clone()),
            history: HistoryLoader::new(ctx.clone()),
            lifecycle: ConversationLifecycleManager::new(ctx.clone()),
            sender: MessageSender::new(ctx.clone()),
            bridge: EventBridge::new(ctx.clone()),
            ctx,
            echo_window_ms,
        }
    }

    // ===== Getters =====

    pub fn identity(&self) -> Identity {
        self.ctx.state.borrow().identity.clone()
    }

    pub fn state(&self) -> SharedState {
        self.ctx.state.clone()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.ctx.state.borrow().snapshot()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.ctx.state.borrow().conversations.conversations().to_vec()
    }

    pub fn total_unread(&self) -> u32 {
        self.ctx.state.borrow().conversations.total_unread()
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.state.borrow().connected
    }

    /// Latest snapshot, updated after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.ctx.publisher.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.ctx.publisher.notices()
    }

    // ===== Inbox =====

    /// Fetch the role-scoped inbox and merge it into the store.
    pub async fn refresh_inbox(&self) -> Result<usize, ChatError> {
        let identity = self.identity();
        match self.ctx.service.inbox(&identity).await {
            Ok(summaries) => {
                let fetched: Vec<Conversation> = summaries.into_iter().map(Into::into).collect();
                let count = {
                    let mut state = self.ctx.state.borrow_mut();
                    let guard = state.load_guard();
                    state.conversations.load(fetched, &guard);
                    state.conversations.len()
                };
                debug!(count, "Inbox refreshed");
                self.ctx.publish();
                Ok(count)
            }
            Err(e) => {
                self.ctx.notify(Notice::network(
                    Operation::LoadInbox,
                    format!("Could not load conversations: {}", e),
                ));
                Err(e)
            }
        }
    }

    // ===== Open conversation =====

    /// Make `peer` the open conversation: join its room, zero its counter and
    /// load its history. Read confirmation and history run concurrently.
    pub async fn open_conversation(&self, peer: &str) -> Result<HistoryOutcome, ChatError> {
        let peer = normalize_address(peer);
        let (ticket, join) = {
            let mut state = self.ctx.state.borrow_mut();
            let ticket = state.begin_open(&peer);
            let join = state
                .connected
                .then(|| ClientEvent::JoinChat(state.identity.pair_with(&peer)));
            (ticket, join)
        };
        if let Some(join) = join {
            if let Err(e) = self.ctx.push.emit(join) {
                debug!(%peer, "Join failed, will rejoin on reconnect: {}", e);
            }
        }
        info!(%peer, "Opened conversation");
        self.ctx.publish();

        let (read, history) = futures::join!(
            self.receipts.mark_read(&peer),
            self.history.load(ticket)
        );
        if let Err(e) = read {
            debug!(%peer, "Read receipt not confirmed: {}", e);
        }
        history
    }

    pub fn close_conversation(&self) {
        self.ctx.state.borrow_mut().close_thread();
        self.ctx.publish();
    }

    /// Open a conversation with `peer`, creating a local stub if none exists.
    pub async fn start_conversation(
        &self,
        peer: &str,
        peer_name: Option<String>,
    ) -> Result<HistoryOutcome, ChatError> {
        self.lifecycle.ensure_conversation(peer, peer_name);
        self.open_conversation(peer).await
    }

    pub async fn mark_read(&self, peer: &str) -> Result<OpState, ChatError> {
        self.receipts.mark_read(peer).await
    }

    pub async fn delete_conversation(&self, peer: &str) -> Result<OpState, ChatError> {
        self.lifecycle.delete(peer).await
    }

    // ===== Sending =====

    pub fn send_text(&self, text: &str) -> Result<DeliveryState, ChatError> {
        self.sender.send_text(text)
    }

    pub async fn send_image(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<DeliveryState, ChatError> {
        self.sender.send_image(file_name, mime_type, bytes).await
    }

    pub async fn retry(&self, local_id: LocalId) -> Result<DeliveryState, ChatError> {
        self.sender.retry(local_id).await
    }

    // ===== Push channel =====

    pub fn handle_channel_event(&self, event: ChannelEvent) -> BridgeOutcome {
        self.bridge.handle(event)
    }

    /// Drop all state of this identity. The session can be reused after a
    /// fresh `refresh_inbox`.
    pub fn logout(&self) {
        {
            let mut state = self.ctx.state.borrow_mut();
            let identity = state.identity.clone();
            *state = ChatState::new(identity, self.echo_window_ms);
        }
        info!("Session state cleared");
        self.ctx.publish();
    }
}

/// A session wired to the HTTP service and the socket push channel.
pub struct ChatRuntime {
    session: ChatSession<HttpMessageService, PushHandle>,
    events_rx: mpsc::Receiver<ChannelEvent>,
    push_task: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl ChatRuntime {
    /// Build the session and start the push channel. Must be called inside a
    /// tokio runtime.
    pub fn connect(config: CoreConfig) -> Result<Self, ChatError> {
        let service = HttpMessageService::new(&config.service_url, config.auth_token.clone())?;
        let client = SocketPushClient::new(config.push_address.clone(), config.reconnect_delay);
        let (push, events_rx, push_task) = client.spawn();
        info!(
            email = %config.identity.email,
            role = %config.identity.role,
            "Chat session started"
        );
        Ok(Self {
            session: ChatSession::new(&config, service, push),
            events_rx,
            push_task: Some(push_task),
            poll_interval: config.poll_interval,
        })
    }

    pub fn session(&self) -> &ChatSession<HttpMessageService, PushHandle> {
        &self.session
    }

    /// Wait for the next push event and apply it. Returns `None` once the
    /// transport has stopped.
    pub async fn next_event(&mut self) -> Option<BridgeOutcome> {
        let event = self.events_rx.recv().await?;
        Some(self.session.handle_channel_event(event))
    }

    /// Apply push events and poll the inbox until `shutdown` resolves.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut poll = tokio::time::interval(self.poll_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Session loop shutting down");
                    break;
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.session.handle_channel_event(event);
                        }
                        None => {
                            debug!("Push channel closed");
                            break;
                        }
                    }
                }
                _ = poll.tick() => {
                    // Failures are published as notices.
                    let _ = self.session.refresh_inbox().await;
                }
            }
        }
    }

    /// Stop the push channel and clear the session.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
        self.events_rx.close();
        self.session.logout();
        info!("Chat session closed");
    }
}

impl Drop for ChatRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
    }
}
