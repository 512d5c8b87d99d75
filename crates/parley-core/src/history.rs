use tracing::debug;

use crate::context::SessionContext;
use crate::error::ChatError;
use crate::events::{Notice, Operation};
use crate::service::MessageService;
use crate::store::HistoryTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Applied,
    /// The open conversation changed while the fetch was in flight.
    Stale,
}

/// Fetches history for the open conversation into the thread buffer.
pub struct HistoryLoader<S, P> {
    ctx: SessionContext<S, P>,
}

impl<S: MessageService, P> HistoryLoader<S, P> {
    pub fn new(ctx: SessionContext<S, P>) -> Self {
        Self { ctx }
    }

    pub async fn load(&self, ticket: HistoryTicket) -> Result<HistoryOutcome, ChatError> {
        let me = self.ctx.state.borrow().identity.email.clone();
        let result = self.ctx.service.history(&me, &ticket.peer).await;

        let mut state = self.ctx.state.borrow_mut();
        if !state.is_current(&ticket) {
            debug!(peer = %ticket.peer, "Discarding stale history");
            return Ok(HistoryOutcome::Stale);
        }

        match result {
            Ok(messages) => {
                state.apply_history(messages);
                drop(state);
                self.ctx.publish();
                Ok(HistoryOutcome::Applied)
            }
            Err(e) => {
                drop(state);
                self.ctx.notify(Notice::network(
                    Operation::LoadHistory,
                    format!("Could not load messages with {}: {}", ticket.peer, e),
                ));
                Err(e)
            }
        }
    }
}
