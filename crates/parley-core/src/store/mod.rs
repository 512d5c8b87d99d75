pub mod conversation_store;
pub mod ledger;
pub mod state;
pub mod thread_buffer;

pub use conversation_store::{ConversationStore, LoadGuard};
pub use ledger::{InFlightLedger, OpId, OpKind, OpState, OptimisticOp};
pub use state::{AppliedLog, ChatState, FailedUpload, HistoryTicket, QueuedSend, SharedState};
pub use thread_buffer::ActiveThreadBuffer;
