use tracing::{info, warn};

use crate::context::SessionContext;
use crate::error::ChatError;
use crate::events::{Notice, Operation};
use crate::models::normalize_address;
use crate::service::MessageService;
use crate::store::{OpKind, OpState};

/// Creation and deletion of conversations.
///
/// ```text
/// absent ─▶ present(unread=N) ─open─▶ unread=0 ─peer sends─▶ unread=N+1 ─delete─▶ absent
/// ```
pub struct ConversationLifecycleManager<S, P> {
    ctx: SessionContext<S, P>,
}

impl<S: MessageService, P> ConversationLifecycleManager<S, P> {
    pub fn new(ctx: SessionContext<S, P>) -> Self {
        Self { ctx }
    }

    /// Synthesize a local stub for `peer` if no conversation exists yet.
    /// No server round trip; returns true if a stub was created.
    pub fn ensure_conversation(&self, peer: &str, peer_name: Option<String>) -> bool {
        let peer = normalize_address(peer);
        let now = self.ctx.now();
        let created = self
            .ctx
            .state
            .borrow_mut()
            .conversations
            .insert_stub(&peer, peer_name, now);
        if created {
            info!(%peer, "Created local conversation stub");
            self.ctx.publish();
        }
        created
    }

    /// Remove the conversation locally, then delete it on the server. On
    /// failure it is put back where it was, with its unread count.
    pub async fn delete(&self, peer: &str) -> Result<OpState, ChatError> {
        let peer = normalize_address(peer);

        let (op, me) = {
            let mut state = self.ctx.state.borrow_mut();
            let Some((index, conversation)) = state.conversations.remove(&peer) else {
                return Err(ChatError::UnknownConversation(peer));
            };
            let was_open = state.thread.is_open(&peer);
            if was_open {
                state.close_thread();
            }
            let op = state.ledger.begin(OpKind::Delete {
                index,
                conversation,
                was_open,
            });
            (op, state.identity.email.clone())
        };
        self.ctx.publish();

        let result = self.ctx.service.delete_conversation(&me, &peer).await;

        match result {
            Ok(()) => {
                self.ctx.state.borrow_mut().ledger.confirm(op);
                info!(%peer, "Deleted conversation");
                self.ctx.publish();
                Ok(OpState::Confirmed)
            }
            Err(e) => {
                let was_open = {
                    let mut state = self.ctx.state.borrow_mut();
                    match state.ledger.compensate(op).map(|settled| settled.kind) {
                        Some(OpKind::Delete {
                            index,
                            conversation,
                            was_open,
                        }) => {
                            state.conversations.reinsert(index, conversation);
                            was_open
                        }
                        _ => false,
                    }
                };
                warn!(%peer, was_open, "Delete failed, conversation restored: {}", e);
                self.ctx.publish();
                self.ctx.notify(Notice::network(
                    Operation::Delete,
                    format!("Could not delete conversation with {}: {}", peer, e),
                ));
                Err(e)
            }
        }
    }
}
