use crate::models::{DeliveryState, LocalId, Message};

/// Ordered message log for the open conversation.
///
/// Messages are kept sorted by timestamp; entries with equal timestamps keep
/// their insertion order.
pub struct ActiveThreadBuffer {
    peer: Option<String>,
    messages: Vec<Message>,
}

impl ActiveThreadBuffer {
    pub fn new() -> Self {
        Self {
            peer: None,
            messages: Vec::new(),
        }
    }

    // ===== Getters =====

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn is_open(&self, peer: &str) -> bool {
        self.peer.as_deref() == Some(peer)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, local_id: LocalId) -> Option<&Message> {
        self.messages.iter().find(|m| m.local_id == Some(local_id))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    // ===== Mutations =====

    /// Switch to another conversation (or none). Always empties the log.
    pub fn reset(&mut self, peer: Option<String>) {
        self.peer = peer;
        self.messages.clear();
    }

    /// Replace the log with fetched history. Failed local entries are carried
    /// over, pending ones only if the history does not have them yet.
    pub fn load_history(&mut self, history: Vec<Message>) {
        let carried: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.is_local() && m.delivery != DeliveryState::Sent)
            .filter(|m| {
                m.delivery == DeliveryState::Failed || !history.iter().any(|h| h.same_content(m))
            })
            .collect();

        let mut history = history;
        history.sort_by_key(|m| m.timestamp);
        self.messages = history;
        for message in carried {
            self.insert_sorted(message);
        }
    }

    /// Append a locally created message before the server has seen it.
    pub fn append_optimistic(&mut self, message: Message) {
        self.insert_sorted(message);
    }

    /// Insert a message delivered by the push channel. Returns false if the
    /// exact message is already present (e.g. it came with the history).
    pub fn append_from_peer(&mut self, message: Message) -> bool {
        let duplicate = self
            .messages
            .iter()
            .any(|m| m.timestamp == message.timestamp && m.same_content(&message));
        if duplicate {
            return false;
        }
        self.insert_sorted(message);
        true
    }

    pub fn set_delivery(&mut self, local_id: LocalId, state: DeliveryState) -> bool {
        match self.messages.iter_mut().find(|m| m.local_id == Some(local_id)) {
            Some(message) => {
                message.delivery = state;
                true
            }
            None => false,
        }
    }

    /// Swap a local entry for an updated version of itself.
    pub fn replace(&mut self, local_id: LocalId, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.local_id == Some(local_id)) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.reset(None);
    }

    fn insert_sorted(&mut self, message: Message) {
        let pos = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(pos, message);
    }
}

impl Default for ActiveThreadBuffer {
    fn default() -> Self {
        Self::new()
    }
}
