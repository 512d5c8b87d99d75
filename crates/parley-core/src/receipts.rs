use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::error::ChatError;
use crate::events::{Notice, Operation};
use crate::models::normalize_address;
use crate::service::MessageService;
use crate::store::{OpKind, OpState};

/// Owns the optimistic zeroing of unread counters and its compensation.
pub struct ReadReceiptCoordinator<S, P> {
    ctx: SessionContext<S, P>,
}

impl<S: MessageService, P> ReadReceiptCoordinator<S, P> {
    pub fn new(ctx: SessionContext<S, P>) -> Self {
        Self { ctx }
    }

    /// Zero the counter for `peer`, then confirm with the service. On failure
    /// the pre-open count is given back and a notice is published.
    pub async fn mark_read(&self, peer: &str) -> Result<OpState, ChatError> {
        let peer = normalize_address(peer);

        let (op, pair) = {
            let mut state = self.ctx.state.borrow_mut();
            let previous_unread = state.conversations.zero_unread(&peer);
            let op = state.ledger.begin(OpKind::MarkRead {
                peer: peer.clone(),
                previous_unread,
            });
            (op, state.identity.pair_with(&peer))
        };
        self.ctx.publish();

        let result = self.ctx.service.mark_as_read(&pair).await;

        match result {
            Ok(()) => {
                self.ctx.state.borrow_mut().ledger.confirm(op);
                debug!(%peer, "Marked conversation as read");
                self.ctx.publish();
                Ok(OpState::Confirmed)
            }
            Err(e) => {
                {
                    let mut state = self.ctx.state.borrow_mut();
                    if let Some(settled) = state.ledger.compensate(op) {
                        if let OpKind::MarkRead {
                            peer,
                            previous_unread,
                        } = settled.kind
                        {
                            if previous_unread > 0
                                && !state.conversations.restore_unread(&peer, previous_unread)
                            {
                                debug!(%peer, "Conversation gone, nothing to restore");
                            }
                        }
                    }
                }
                warn!(%peer, "Mark as read failed, unread count restored: {}", e);
                self.ctx.publish();
                self.ctx.notify(Notice::network(
                    Operation::MarkAsRead,
                    format!("Could not mark conversation with {} as read: {}", peer, e),
                ));
                Err(e)
            }
        }
    }
}
