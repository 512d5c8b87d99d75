use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::{ChatError, ValidationError};
use crate::events::{Notice, Operation};
use crate::models::{DeliveryState, LocalId, Message, Payload};
use crate::service::{ImageUpload, MessageService};
use crate::store::{FailedUpload, OpKind, QueuedSend};
use crate::streaming::{ClientEvent, PushChannel, SendMessage};

/// Optimistic sends over the push channel and image uploads over REST.
pub struct MessageSender<S, P> {
    ctx: SessionContext<S, P>,
}

impl<S: MessageService, P: PushChannel> MessageSender<S, P> {
    pub fn new(ctx: SessionContext<S, P>) -> Self {
        Self { ctx }
    }

    /// Append `text` to the open thread at once and hand it to the push channel.
    /// Blank text or no open conversation is rejected before anything changes.
    pub fn send_text(&self, text: &str) -> Result<DeliveryState, ChatError> {
        let peer = self.open_peer_for(text.trim().is_empty(), ValidationError::EmptyText)?;
        let now = self.ctx.now();
        let (message, event) = {
            let mut state = self.ctx.state.borrow_mut();
            let me = state.identity.email.clone();
            let message = Message::optimistic(&me, &peer, Payload::Text(text.to_string()), now);
            let event = ClientEvent::SendMessage(SendMessage::new(
                state.identity.pair_with(&peer),
                text,
                &me,
            ));
            state.conversations.insert_stub(&peer, None, now);
            state.conversations.record_outgoing(&peer, &message);
            state.track_outgoing(message.clone());
            (message, event)
        };
        self.ctx.publish();
        self.dispatch(message, event)
    }

    /// Upload an image to the open conversation, then append it. A failed
    /// upload leaves a failed entry that keeps the bytes for `retry`.
    pub async fn send_image(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<DeliveryState, ChatError> {
        let peer = self.open_peer_for(bytes.is_empty(), ValidationError::EmptyImage)?;
        let upload = FailedUpload {
            peer,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        };
        self.upload(LocalId::new(), upload, false).await
    }

    /// Re-send a failed message.
    pub async fn retry(&self, local_id: LocalId) -> Result<DeliveryState, ChatError> {
        let pending_upload = self.ctx.state.borrow_mut().failed_uploads.remove(&local_id);
        if let Some(upload) = pending_upload {
            return self.upload(local_id, upload, true).await;
        }

        let (message, event) = {
            let mut state = self.ctx.state.borrow_mut();
            let message = match state.unconfirmed(local_id) {
                Some(m) if m.delivery == DeliveryState::Failed => m.clone(),
                Some(_) => {
                    return Err(ValidationError::NotRetryable(local_id.to_string()).into())
                }
                None => return Err(ChatError::UnknownMessage(local_id.to_string())),
            };
            let Payload::Text(text) = &message.payload else {
                return Err(ValidationError::NotRetryable(local_id.to_string()).into());
            };
            let event = ClientEvent::SendMessage(SendMessage::new(
                state.identity.pair_with(&message.to),
                text,
                &message.from,
            ));
            state.set_delivery(local_id, DeliveryState::Pending);
            (message, event)
        };
        info!(%local_id, "Retrying message");
        self.ctx.publish();
        self.dispatch(message, event)
    }

    /// Emit queued sends in order. Stops at the first failure.
    pub fn flush_outbox(&self) -> usize {
        let mut flushed = 0;
        loop {
            let Some(queued) = self.ctx.state.borrow_mut().outbox.pop_front() else {
                break;
            };
            match self.ctx.push.emit(queued.event.clone()) {
                Ok(()) => {
                    flushed += 1;
                    if let Some(local_id) = queued.local_id {
                        self.mark_emitted(local_id);
                    }
                }
                Err(e) => {
                    debug!("Outbox flush interrupted: {}", e);
                    self.ctx.state.borrow_mut().outbox.push_front(queued);
                    break;
                }
            }
        }
        if flushed > 0 {
            info!(flushed, "Flushed queued messages");
            self.ctx.publish();
        }
        flushed
    }

    /// Put frames the transport could not write back in front of the outbox.
    /// Room joins are dropped; the reconnect rejoins the open room.
    pub fn requeue_unsent(&self, unsent: Vec<ClientEvent>) {
        {
            let mut state = self.ctx.state.borrow_mut();
            let me = state.identity.email.clone();
            for event in unsent.into_iter().rev() {
                let ClientEvent::SendMessage(send) = &event else {
                    continue;
                };
                let peer = if send.buyer_email == me {
                    send.seller_email.clone()
                } else {
                    send.buyer_email.clone()
                };
                let claimed = state.claim_in_transit(&peer, &send.text);
                let local_id = claimed.as_ref().and_then(|m| m.local_id);
                match claimed {
                    Some(message) => state.reopen_send(message),
                    None => debug!(%peer, "Unsent frame has no local entry"),
                }
                state.outbox.push_front(QueuedSend { local_id, event });
            }
        }
        self.ctx.publish();
    }

    fn open_peer_for(&self, blank: bool, reason: ValidationError) -> Result<String, ChatError> {
        let open_peer = self.ctx.state.borrow().open_peer().map(str::to_string);
        let rejection = match open_peer {
            _ if blank => reason,
            Some(peer) => return Ok(peer),
            None => ValidationError::NoActivePeer,
        };
        self.ctx
            .notify(Notice::validation(Operation::Send, rejection.to_string()));
        Err(rejection.into())
    }

    fn dispatch(&self, message: Message, event: ClientEvent) -> Result<DeliveryState, ChatError> {
        let Some(local_id) = message.local_id else {
            return Err(ChatError::UnknownMessage(message.payload.preview()));
        };

        if !self.ctx.state.borrow().connected {
            debug!(%local_id, "Push channel down, queueing message");
            self.ctx.state.borrow_mut().outbox.push_back(QueuedSend {
                local_id: Some(local_id),
                event,
            });
            self.ctx.publish();
            return Ok(DeliveryState::Pending);
        }

        match self.ctx.push.emit(event.clone()) {
            Ok(()) => {
                self.mark_emitted(local_id);
                self.ctx.publish();
                Ok(DeliveryState::Sent)
            }
            Err(ChatError::ChannelDisconnected) => {
                let mut state = self.ctx.state.borrow_mut();
                state.connected = false;
                state.outbox.push_back(QueuedSend {
                    local_id: Some(local_id),
                    event,
                });
                drop(state);
                self.ctx.publish();
                Ok(DeliveryState::Pending)
            }
            Err(e) => {
                self.ctx
                    .state
                    .borrow_mut()
                    .set_delivery(local_id, DeliveryState::Failed);
                warn!(%local_id, "Send failed: {}", e);
                self.ctx.publish();
                self.ctx.notify(Notice::network(
                    Operation::Send,
                    format!("Message to {} was not sent: {}", message.to, e),
                ));
                Err(e)
            }
        }
    }

    /// The frame left this client: remember it for echo matching.
    fn mark_emitted(&self, local_id: LocalId) {
        let now = self.ctx.now();
        let mut state = self.ctx.state.borrow_mut();
        if let Some(message) = state.unconfirmed(local_id).cloned() {
            state.conversations.record_local_send(&message, now);
            state.mark_in_transit(message, now);
        }
        state.set_delivery(local_id, DeliveryState::Sent);
    }

    async fn upload(
        &self,
        local_id: LocalId,
        upload: FailedUpload,
        is_retry: bool,
    ) -> Result<DeliveryState, ChatError> {
        let (op, request) = {
            let mut state = self.ctx.state.borrow_mut();
            if is_retry {
                state.set_delivery(local_id, DeliveryState::Pending);
            }
            let op = state.ledger.begin(OpKind::Send {
                peer: upload.peer.clone(),
                local_id,
            });
            let request = ImageUpload {
                from: state.identity.email.clone(),
                to: upload.peer.clone(),
                file_name: upload.file_name.clone(),
                mime_type: upload.mime_type.clone(),
                bytes: upload.bytes.clone(),
            };
            (op, request)
        };
        self.ctx.publish();

        let result = self.ctx.service.upload_image(&request).await;
        let now = self.ctx.now();

        match result {
            Ok(url) => {
                {
                    let mut state = self.ctx.state.borrow_mut();
                    state.ledger.confirm(op);
                    let resolved = if is_retry {
                        state.resolve_upload(local_id, &url)
                    } else {
                        None
                    };
                    let message = match resolved {
                        Some(message) => message,
                        None => {
                            let mut message = Message::optimistic(
                                &request.from,
                                &request.to,
                                Payload::Image(url.clone()),
                                now,
                            );
                            message.local_id = Some(local_id);
                            message.delivery = DeliveryState::Sent;
                            state.track_outgoing(message.clone());
                            message
                        }
                    };
                    // The service broadcasts the stored image; its echo must collapse.
                    state.conversations.record_local_send(&message, now);
                    state.conversations.record_outgoing(&request.to, &message);
                }
                info!(peer = %request.to, "Image sent");
                self.ctx.publish();
                Ok(DeliveryState::Sent)
            }
            Err(e) => {
                {
                    let mut state = self.ctx.state.borrow_mut();
                    state.ledger.compensate(op);
                    if is_retry {
                        state.set_delivery(local_id, DeliveryState::Failed);
                    } else {
                        let mut message = Message::optimistic(
                            &request.from,
                            &request.to,
                            Payload::Image(upload.file_name.clone()),
                            now,
                        );
                        message.local_id = Some(local_id);
                        message.delivery = DeliveryState::Failed;
                        state.track_outgoing(message);
                    }
                    state.failed_uploads.insert(local_id, upload);
                }
                warn!(peer = %request.to, "Image upload failed: {}", e);
                self.ctx.publish();
                self.ctx.notify(Notice::network(
                    Operation::UploadImage,
                    format!("Image to {} was not sent: {}", request.to, e),
                ));
                Err(e)
            }
        }
    }
}
