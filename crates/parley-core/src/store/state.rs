use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::constants::{APPLIED_LOG_CAPACITY, IN_TRANSIT_RETENTION_MS};
use crate::events::ChatSnapshot;
use crate::models::{DeliveryState, Identity, LocalId, Message, Payload, Timestamp};
use crate::store::{ActiveThreadBuffer, ConversationStore, InFlightLedger, LoadGuard};
use crate::streaming::ClientEvent;

pub type SharedState = Rc<RefCell<ChatState>>;

/// Names the conversation a history fetch was issued for. A fetch whose ticket
/// is no longer current is discarded when it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    pub peer: String,
    epoch: u64,
}

/// Bounded memory of applied push messages, so a replay after reconnect is
/// dropped instead of applied twice.
pub struct AppliedLog {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl AppliedLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if the fingerprint was already applied.
    pub fn insert(&mut self, fingerprint: String) -> bool {
        if self.seen.contains(&fingerprint) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(fingerprint.clone());
        self.order.push_back(fingerprint);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A send attempted while the push channel was down.
#[derive(Debug, Clone)]
pub struct QueuedSend {
    pub local_id: Option<LocalId>,
    pub event: ClientEvent,
}

/// A frame handed to the push channel whose echo has not arrived yet.
#[derive(Debug, Clone)]
struct InTransit {
    message: Message,
    emitted_at: Timestamp,
}

/// Bytes of an image whose upload failed, kept for retry.
#[derive(Debug, Clone)]
pub struct FailedUpload {
    pub peer: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// All client-side chat state of one identity session.
pub struct ChatState {
    pub identity: Identity,
    pub conversations: ConversationStore,
    pub thread: ActiveThreadBuffer,
    pub ledger: InFlightLedger,
    pub applied: AppliedLog,
    pub outbox: VecDeque<QueuedSend>,
    /// Local messages not yet confirmed, across all peers.
    unconfirmed: Vec<Message>,
    in_transit: VecDeque<InTransit>,
    pub failed_uploads: HashMap<LocalId, FailedUpload>,
    pub connected: bool,
    open_epoch: u64,
}

impl ChatState {
    pub fn new(identity: Identity, echo_window_ms: i64) -> Self {
        Self {
            identity,
            conversations: ConversationStore::new(echo_window_ms),
            thread: ActiveThreadBuffer::new(),
            ledger: InFlightLedger::new(),
            applied: AppliedLog::new(APPLIED_LOG_CAPACITY),
            outbox: VecDeque::new(),
            unconfirmed: Vec::new(),
            in_transit: VecDeque::new(),
            failed_uploads: HashMap::new(),
            connected: false,
            open_epoch: 0,
        }
    }

    pub fn shared(identity: Identity, echo_window_ms: i64) -> SharedState {
        Rc::new(RefCell::new(Self::new(identity, echo_window_ms)))
    }

    pub fn open_peer(&self) -> Option<&str> {
        self.thread.peer()
    }

    /// Point the thread at `peer` and issue a ticket for its history fetch.
    /// Unconfirmed local messages for `peer` are shown right away.
    pub fn begin_open(&mut self, peer: &str) -> HistoryTicket {
        self.open_epoch += 1;
        self.thread.reset(Some(peer.to_string()));
        for message in self.unconfirmed.iter().filter(|m| m.to == peer) {
            self.thread.append_optimistic(message.clone());
        }
        HistoryTicket {
            peer: peer.to_string(),
            epoch: self.open_epoch,
        }
    }

    /// Unset the open pointer and empty the thread.
    pub fn close_thread(&mut self) {
        self.open_epoch += 1;
        self.thread.clear();
    }

    pub fn is_current(&self, ticket: &HistoryTicket) -> bool {
        ticket.epoch == self.open_epoch && self.thread.is_open(&ticket.peer)
    }

    /// Record a local message; it is shown if its conversation is open.
    pub fn track_outgoing(&mut self, message: Message) {
        if self.thread.is_open(&message.to) {
            self.thread.append_optimistic(message.clone());
        }
        if message.delivery != DeliveryState::Sent {
            self.unconfirmed.push(message);
        }
    }

    pub fn unconfirmed(&self, local_id: LocalId) -> Option<&Message> {
        self.unconfirmed
            .iter()
            .find(|m| m.local_id == Some(local_id))
    }

    /// Remember an emitted text frame until its echo arrives.
    pub fn mark_in_transit(&mut self, message: Message, now: Timestamp) {
        self.in_transit.retain(|t| {
            now.saturating_sub(t.emitted_at) <= IN_TRANSIT_RETENTION_MS
                && t.message.local_id != message.local_id
        });
        self.in_transit.push_back(InTransit {
            message,
            emitted_at: now,
        });
    }

    /// Take the newest in-transit message to `peer` with this body.
    pub fn claim_in_transit(&mut self, peer: &str, text: &str) -> Option<Message> {
        let index = self.in_transit.iter().rposition(|t| {
            t.message.to == peer && matches!(&t.message.payload, Payload::Text(body) if body == text)
        })?;
        self.in_transit.remove(index).map(|t| t.message)
    }

    /// The server echoed a local message: it is sent and no longer in transit.
    pub fn confirm_echo(&mut self, local_id: LocalId) -> bool {
        self.in_transit
            .retain(|t| t.message.local_id != Some(local_id));
        self.set_delivery(local_id, DeliveryState::Sent)
    }

    /// An emitted message was not written after all: track it as pending again.
    pub fn reopen_send(&mut self, message: Message) {
        let Some(local_id) = message.local_id else {
            return;
        };
        self.thread.set_delivery(local_id, DeliveryState::Pending);
        match self
            .unconfirmed
            .iter_mut()
            .find(|m| m.local_id == Some(local_id))
        {
            Some(tracked) => tracked.delivery = DeliveryState::Pending,
            None => self.unconfirmed.push(Message {
                delivery: DeliveryState::Pending,
                ..message
            }),
        }
    }

    /// Local id of a pending message with the same content as `incoming`.
    pub fn pending_copy(&self, incoming: &Message) -> Option<LocalId> {
        self.unconfirmed
            .iter()
            .find(|m| m.delivery == DeliveryState::Pending && m.same_content(incoming))
            .and_then(|m| m.local_id)
    }

    /// Move a local message to `delivery`, wherever it is shown. Sent messages
    /// are no longer tracked.
    pub fn set_delivery(&mut self, local_id: LocalId, delivery: DeliveryState) -> bool {
        let in_thread = self.thread.set_delivery(local_id, delivery);
        let tracked = match self
            .unconfirmed
            .iter()
            .position(|m| m.local_id == Some(local_id))
        {
            Some(index) if delivery == DeliveryState::Sent => {
                self.unconfirmed.remove(index);
                true
            }
            Some(index) => {
                self.unconfirmed[index].delivery = delivery;
                true
            }
            None => false,
        };
        in_thread || tracked
    }

    /// Replace the open thread with fetched history. Pending local messages
    /// the server already has are confirmed.
    pub fn apply_history(&mut self, history: Vec<Message>) {
        let confirmed: Vec<LocalId> = self
            .unconfirmed
            .iter()
            .filter(|m| m.delivery == DeliveryState::Pending && self.thread.is_open(&m.to))
            .filter(|m| history.iter().any(|h| h.same_content(m)))
            .filter_map(|m| m.local_id)
            .collect();
        self.thread.load_history(history);
        self.unconfirmed
            .retain(|m| !m.local_id.is_some_and(|id| confirmed.contains(&id)));
    }

    /// A retried upload succeeded: the failed entry now points at the stored image.
    pub fn resolve_upload(&mut self, local_id: LocalId, url: &str) -> Option<Message> {
        let index = self
            .unconfirmed
            .iter()
            .position(|m| m.local_id == Some(local_id))?;
        let mut message = self.unconfirmed.remove(index);
        message.payload = Payload::Image(url.to_string());
        message.delivery = DeliveryState::Sent;
        self.thread.replace(local_id, message.clone());
        Some(message)
    }

    pub fn load_guard(&self) -> LoadGuard {
        LoadGuard {
            open_peer: self.open_peer().map(str::to_string),
            reads_in_flight: self.ledger.reads_in_flight(),
            deletes_in_flight: self.ledger.deletes_in_flight(),
        }
    }

    /// True when no optimistic operation is waiting for the server.
    pub fn is_settled(&self) -> bool {
        self.ledger.is_empty()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            conversations: self.conversations.conversations().to_vec(),
            total_unread: self.conversations.total_unread(),
            open_peer: self.open_peer().map(str::to_string),
            thread: self.thread.messages().to_vec(),
            connected: self.connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_applied_log_evicts_oldest() {
        let mut log = AppliedLog::new(2);
        assert!(log.insert("a".into()));
        assert!(!log.insert("a".into()));
        assert!(log.insert("b".into()));
        assert!(log.insert("c".into()));
        assert_eq!(log.len(), 2);
        // "a" was evicted and is accepted again.
        assert!(log.insert("a".into()));
        assert!(!log.insert("c".into()));
    }

    #[test]
    fn test_in_transit_outlives_echo_window() {
        let mut state = ChatState::new(Identity::new("me@x", Role::Buyer), 2_000);
        let first = Message::optimistic("me@x", "s", Payload::Text("same".into()), 0);
        let second = Message::optimistic("me@x", "s", Payload::Text("same".into()), 0);
        state.mark_in_transit(first.clone(), 0);
        state.mark_in_transit(second.clone(), 10_000);

        let claimed = state.claim_in_transit("s", "same").unwrap();
        assert_eq!(claimed.local_id, second.local_id);
        let claimed = state.claim_in_transit("s", "same").unwrap();
        assert_eq!(claimed.local_id, first.local_id);
        assert!(state.claim_in_transit("s", "same").is_none());

        state.mark_in_transit(first.clone(), 20_000);
        state.confirm_echo(first.local_id.unwrap());
        assert!(state.claim_in_transit("s", "same").is_none());
    }

    #[test]
    fn test_ticket_goes_stale_on_switch_and_reopen() {
        let mut state = ChatState::new(Identity::new("me@x", Role::Buyer), 2_000);
        let first_a = state.begin_open("a");
        assert!(state.is_current(&first_a));

        let b = state.begin_open("b");
        assert!(!state.is_current(&first_a));
        assert!(state.is_current(&b));

        let second_a = state.begin_open("a");
        assert!(!state.is_current(&first_a));
        assert!(state.is_current(&second_a));

        state.close_thread();
        assert!(!state.is_current(&second_a));
        assert!(state.open_peer().is_none());
    }
}
