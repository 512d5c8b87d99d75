use tracing::{debug, info, trace};

use crate::context::SessionContext;
use crate::events::Notice;
use crate::sender::MessageSender;
use crate::service::MessageService;
use crate::streaming::{ChannelEvent, ClientEvent, PushChannel, ServerEvent};

/// What happened to one push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// A peer's message was applied.
    Inbound,
    /// Our own message came back and was reconciled.
    Echo,
    /// Neither party is the current identity.
    Discarded,
    /// Already applied before.
    Replay,
    /// A connection state change.
    Connection,
}

/// Translates push channel events into store mutations.
pub struct EventBridge<S, P> {
    ctx: SessionContext<S, P>,
    sender: MessageSender<S, P>,
}

impl<S: MessageService, P: PushChannel> EventBridge<S, P> {
    pub fn new(ctx: SessionContext<S, P>) -> Self {
        let sender = MessageSender::new(ctx.clone());
        Self { ctx, sender }
    }

    pub fn handle(&self, event: ChannelEvent) -> BridgeOutcome {
        match event {
            ChannelEvent::Connected => {
                self.on_connected();
                BridgeOutcome::Connection
            }
            ChannelEvent::Disconnected { unsent } => {
                self.on_disconnected(unsent);
                BridgeOutcome::Connection
            }
            ChannelEvent::Server(event) => self.on_server_event(event),
        }
    }

    fn on_connected(&self) {
        let rejoin = {
            let mut state = self.ctx.state.borrow_mut();
            state.connected = true;
            state
                .open_peer()
                .map(|peer| ClientEvent::JoinChat(state.identity.pair_with(peer)))
        };
        if let Some(join) = rejoin {
            if let Err(e) = self.ctx.push.emit(join) {
                debug!("Rejoin failed: {}", e);
            }
        }
        info!("Push channel connected");
        self.sender.flush_outbox();
        self.ctx.publish();
    }

    fn on_disconnected(&self, unsent: Vec<ClientEvent>) {
        self.ctx.state.borrow_mut().connected = false;
        if !unsent.is_empty() {
            self.sender.requeue_unsent(unsent);
        }
        self.ctx.publish();
        self.ctx
            .notify(Notice::disconnected("Connection to chat lost, reconnecting"));
    }

    fn on_server_event(&self, event: ServerEvent) -> BridgeOutcome {
        let now = self.ctx.now();
        let stamped = event.is_stamped();
        let message = event.into_message(now);
        // Arrival time differs per delivery, so it cannot identify a replay.
        let fingerprint = if stamped {
            message.fingerprint()
        } else {
            message.content_fingerprint()
        };

        let outcome = {
            let mut state = self.ctx.state.borrow_mut();
            let inbound = state.identity.is_me(&message.to);
            let echo = state.identity.is_me(&message.from);
            if !inbound && !echo {
                trace!(from = %message.from, to = %message.to, "Discarding foreign message");
                return BridgeOutcome::Discarded;
            }
            if !state.applied.insert(fingerprint) {
                debug!(from = %message.from, "Dropping replayed message");
                return BridgeOutcome::Replay;
            }

            if inbound && !echo {
                let peer = message.from.clone();
                let open = state.thread.is_open(&peer);
                state.conversations.upsert_from_push(&peer, &message, !open);
                if open {
                    state.thread.append_from_peer(message);
                }
                BridgeOutcome::Inbound
            } else {
                let peer = message.to.clone();
                match state.conversations.take_echo(&message, now) {
                    Some(local_id) => {
                        state.confirm_echo(local_id);
                    }
                    None => match state.pending_copy(&message) {
                        // The echo outlived the window; still ours.
                        Some(local_id) => {
                            state.confirm_echo(local_id);
                        }
                        // Sent from another session of this identity.
                        None => {
                            state.conversations.upsert_from_push(&peer, &message, false);
                            if state.thread.is_open(&peer) {
                                state.thread.append_from_peer(message);
                            }
                        }
                    },
                }
                BridgeOutcome::Echo
            }
        };
        self.ctx.publish();
        outcome
    }
}
