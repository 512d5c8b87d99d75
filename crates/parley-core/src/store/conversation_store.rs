use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{Conversation, LocalId, Message, Timestamp};

/// Conversations whose local state must survive an inbox load.
#[derive(Debug, Default)]
pub struct LoadGuard {
    /// The open conversation; its counter was zeroed locally.
    pub open_peer: Option<String>,
    /// Conversations with a mark-as-read in flight.
    pub reads_in_flight: HashSet<String>,
    /// Conversations with a delete in flight; a load must not resurrect them.
    pub deletes_in_flight: HashSet<String>,
}

impl LoadGuard {
    fn holds_unread(&self, peer: &str) -> bool {
        self.open_peer.as_deref() == Some(peer) || self.reads_in_flight.contains(peer)
    }

    fn suppresses(&self, peer: &str) -> bool {
        self.deletes_in_flight.contains(peer)
    }
}

#[derive(Debug, Clone)]
struct RecentSend {
    message: Message,
    emitted_at: Timestamp,
}

/// Sub-store for conversation summaries. The unread badge is derived from it.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    total_unread: u32,
    recent_sends: VecDeque<RecentSend>,
    echo_window_ms: i64,
}

impl ConversationStore {
    pub fn new(echo_window_ms: i64) -> Self {
        Self {
            conversations: Vec::new(),
            total_unread: 0,
            recent_sends: VecDeque::new(),
            echo_window_ms,
        }
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.recent_sends.clear();
        self.recompute();
    }

    // ===== Getters =====

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, peer: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.peer == peer)
    }

    pub fn position(&self, peer: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.peer == peer)
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.position(peer).is_some()
    }

    pub fn unread_for(&self, peer: &str) -> u32 {
        self.get(peer).map(|c| c.unread_count).unwrap_or(0)
    }

    /// Sum of all unread counters, recomputed after every mutation.
    pub fn total_unread(&self) -> u32 {
        self.total_unread
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    // ===== Mutations =====

    /// Merge a fetched inbox. Server order wins; local state wins where the
    /// guard says an optimistic change is still authoritative. Rows missing
    /// from the fetch are kept: only a confirmed delete removes a conversation.
    pub fn load(&mut self, fetched: Vec<Conversation>, guard: &LoadGuard) {
        let previous: Vec<Conversation> = std::mem::take(&mut self.conversations);
        let fetched_peers: HashSet<&str> = fetched.iter().map(|c| c.peer.as_str()).collect();

        let (stubs, missing): (Vec<Conversation>, Vec<Conversation>) = previous
            .iter()
            .filter(|c| !fetched_peers.contains(c.peer.as_str()))
            .filter(|c| !guard.suppresses(&c.peer))
            .cloned()
            .partition(|c| c.local_stub);

        // Stubs the server has not seen yet stay at the head.
        let head = stubs.len();
        let mut next = stubs;

        let previous_by_peer: HashMap<&str, &Conversation> =
            previous.iter().map(|c| (c.peer.as_str(), c)).collect();
        let mut seen: HashSet<String> = next.iter().map(|c| c.peer.clone()).collect();

        for mut conversation in fetched {
            if guard.suppresses(&conversation.peer) || !seen.insert(conversation.peer.clone()) {
                continue;
            }

            match previous_by_peer.get(conversation.peer.as_str()) {
                Some(local) => {
                    if guard.holds_unread(&conversation.peer) {
                        conversation.unread_count = local.unread_count;
                    }
                    // A push applied after the poll was issued is newer than the poll.
                    if local.timestamp > conversation.timestamp {
                        conversation.last_message = local.last_message.clone();
                        conversation.last_message_from = local.last_message_from.clone();
                        conversation.timestamp = local.timestamp;
                    }
                    if conversation.peer_name.is_none() {
                        conversation.peer_name = local.peer_name.clone();
                    }
                }
                None => {
                    if guard.holds_unread(&conversation.peer) {
                        conversation.unread_count = 0;
                    }
                }
            }
            next.push(conversation);
        }

        // Applied from push after the poll was served; placed by recency.
        for conversation in missing {
            if !seen.insert(conversation.peer.clone()) {
                continue;
            }
            let index = next
                .iter()
                .skip(head)
                .position(|c| c.timestamp < conversation.timestamp)
                .map_or(next.len(), |offset| head + offset);
            next.insert(index, conversation);
        }

        self.conversations = next;
        self.recompute();
    }

    /// Apply a push message to the conversation with `peer`, creating it at the
    /// head when unknown. Only path that raises an unread counter.
    pub fn upsert_from_push(&mut self, peer: &str, message: &Message, raise_unread: bool) {
        let conversation = match self.position(peer) {
            Some(index) => {
                let mut conversation = self.conversations.remove(index);
                if message.timestamp >= conversation.timestamp {
                    conversation.apply_preview(message);
                    self.conversations.insert(0, conversation);
                } else {
                    // Late arrival: counts, but does not become the preview.
                    self.conversations.insert(index, conversation);
                }
                self.position(peer).and_then(|i| self.conversations.get_mut(i))
            }
            None => {
                self.conversations
                    .insert(0, Conversation::from_message(peer, message));
                self.conversations.first_mut()
            }
        };

        if let Some(conversation) = conversation {
            conversation.local_stub = false;
            if raise_unread {
                conversation.unread_count = conversation.unread_count.saturating_add(1);
            }
        }
        self.recompute();
    }

    /// Update the preview for a locally sent message.
    pub fn record_outgoing(&mut self, peer: &str, message: &Message) {
        if let Some(index) = self.position(peer) {
            let mut conversation = self.conversations.remove(index);
            conversation.apply_preview(message);
            self.conversations.insert(0, conversation);
        }
        self.recompute();
    }

    /// Insert a local stub at the head. Returns false if the peer is known.
    pub fn insert_stub(&mut self, peer: &str, peer_name: Option<String>, now: Timestamp) -> bool {
        if self.contains(peer) {
            return false;
        }
        self.conversations
            .insert(0, Conversation::stub(peer, peer_name, now));
        self.recompute();
        true
    }

    /// Zero a counter and return the previous value.
    pub fn zero_unread(&mut self, peer: &str) -> u32 {
        let previous = match self.conversations.iter_mut().find(|c| c.peer == peer) {
            Some(conversation) => std::mem::take(&mut conversation.unread_count),
            None => 0,
        };
        self.recompute();
        previous
    }

    /// Give back `count` unread messages after a failed mark-as-read. Anything
    /// that arrived since the optimistic zeroing is kept.
    pub fn restore_unread(&mut self, peer: &str, count: u32) -> bool {
        let restored = match self.conversations.iter_mut().find(|c| c.peer == peer) {
            Some(conversation) => {
                conversation.unread_count = conversation.unread_count.saturating_add(count);
                true
            }
            None => false,
        };
        self.recompute();
        restored
    }

    /// Delete the entry, returning it with its index.
    pub fn remove(&mut self, peer: &str) -> Option<(usize, Conversation)> {
        let index = self.position(peer)?;
        let conversation = self.conversations.remove(index);
        self.recent_sends.retain(|s| s.message.to != peer);
        self.recompute();
        Some((index, conversation))
    }

    /// Put a removed conversation back at its previous position. If a push
    /// recreated it in the meantime the two are merged.
    pub fn reinsert(&mut self, index: usize, mut conversation: Conversation) {
        if let Some(current_index) = self.position(&conversation.peer) {
            let current = self.conversations.remove(current_index);
            conversation.unread_count = conversation.unread_count.saturating_add(current.unread_count);
            if current.timestamp > conversation.timestamp {
                conversation.last_message = current.last_message;
                conversation.last_message_from = current.last_message_from;
                conversation.timestamp = current.timestamp;
            }
        }
        let index = index.min(self.conversations.len());
        self.conversations.insert(index, conversation);
        self.recompute();
    }

    // ===== Echo tracking =====

    /// Remember an outbound message at the moment it is emitted.
    pub fn record_local_send(&mut self, message: &Message, emitted_at: Timestamp) {
        self.prune_sends(emitted_at);
        self.recent_sends.retain(|s| s.message.local_id != message.local_id);
        self.recent_sends.push_back(RecentSend {
            message: message.clone(),
            emitted_at,
        });
    }

    /// If `incoming` is the echo of a recently emitted message, consume the
    /// record and return the local id of the optimistic entry.
    pub fn take_echo(&mut self, incoming: &Message, now: Timestamp) -> Option<LocalId> {
        self.prune_sends(now);
        let index = self
            .recent_sends
            .iter()
            .position(|s| s.message.same_content(incoming))?;
        self.recent_sends
            .remove(index)
            .and_then(|s| s.message.local_id)
    }

    fn prune_sends(&mut self, now: Timestamp) {
        let window = self.echo_window_ms;
        self.recent_sends
            .retain(|s| now.saturating_sub(s.emitted_at) <= window);
    }

    fn recompute(&mut self) {
        self.total_unread = self.conversations.iter().map(|c| c.unread_count).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ECHO_WINDOW_MS;
    use crate::models::Payload;

    fn summary(peer: &str, unread: u32, ts: Timestamp) -> Conversation {
        Conversation {
            peer: peer.to_string(),
            peer_name: None,
            last_message: Some(format!("from {}", peer)),
            last_message_from: Some(peer.to_string()),
            unread_count: unread,
            timestamp: ts,
            local_stub: false,
        }
    }

    fn text(from: &str, to: &str, body: &str, ts: Timestamp) -> Message {
        Message::delivered(from, to, Payload::Text(body.to_string()), ts)
    }

    fn assert_derived(store: &ConversationStore) {
        let sum: u32 = store.conversations().iter().map(|c| c.unread_count).sum();
        assert_eq!(store.total_unread(), sum);
    }

    #[test]
    fn test_load_keeps_open_peer_zeroed() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("s1", 2, 10), summary("s2", 1, 5)], &LoadGuard::default());
        assert_eq!(store.total_unread(), 3);

        store.zero_unread("s1");
        let guard = LoadGuard {
            open_peer: Some("s1".into()),
            ..Default::default()
        };
        // Stale poll still reports two unread for the open conversation.
        store.load(vec![summary("s1", 2, 10), summary("s2", 1, 5)], &guard);

        assert_eq!(store.unread_for("s1"), 0);
        assert_eq!(store.unread_for("s2"), 1);
        assert_eq!(store.total_unread(), 1);
        assert_derived(&store);
    }

    #[test]
    fn test_load_does_not_resurrect_pending_delete() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("s1", 0, 10), summary("s2", 4, 5)], &LoadGuard::default());
        store.remove("s2");

        let mut guard = LoadGuard::default();
        guard.deletes_in_flight.insert("s2".into());
        store.load(vec![summary("s1", 0, 10), summary("s2", 4, 5)], &guard);

        assert!(!store.contains("s2"));
        assert_eq!(store.total_unread(), 0);
    }

    #[test]
    fn test_load_keeps_unknown_stub_and_newer_push_preview() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("s1", 0, 10)], &LoadGuard::default());
        store.insert_stub("new", Some("New Shop".into()), 20);
        store.upsert_from_push("s1", &text("s1", "me", "latest", 30), true);

        store.load(vec![summary("s1", 1, 10)], &LoadGuard::default());

        assert_eq!(store.conversations()[0].peer, "new");
        assert!(store.conversations()[0].local_stub);
        let s1 = store.get("s1").unwrap();
        assert_eq!(s1.last_message.as_deref(), Some("latest"));
        assert_eq!(s1.timestamp, 30);
        assert_eq!(s1.unread_count, 1);
    }

    #[test]
    fn test_load_keeps_pushed_rows_missing_from_poll() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("a", 0, 30), summary("b", 0, 10)], &LoadGuard::default());
        store.upsert_from_push("c", &text("c", "me", "new", 20), true);

        // The poll was served before the server stored the pushed message.
        store.load(vec![summary("a", 0, 30), summary("b", 0, 10)], &LoadGuard::default());

        let peers: Vec<&str> = store.conversations().iter().map(|c| c.peer.as_str()).collect();
        assert_eq!(peers, vec!["a", "c", "b"]);
        assert_eq!(store.unread_for("c"), 1);
        assert_eq!(store.total_unread(), 1);
        assert_derived(&store);
    }

    #[test]
    fn test_upsert_creates_at_head_and_counts() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("s1", 0, 10)], &LoadGuard::default());

        store.upsert_from_push("s2", &text("s2", "me", "hi", 20), true);
        store.upsert_from_push("s2", &text("s2", "me", "again", 21), true);
        store.upsert_from_push("s1", &text("s1", "me", "open", 22), false);

        assert_eq!(store.conversations()[0].peer, "s1");
        assert_eq!(store.unread_for("s2"), 2);
        assert_eq!(store.unread_for("s1"), 0);
        assert_eq!(store.total_unread(), 2);
        assert_derived(&store);
    }

    #[test]
    fn test_late_push_does_not_regress_preview() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.upsert_from_push("s1", &text("s1", "me", "second", 20), true);
        store.upsert_from_push("s1", &text("s1", "me", "first", 10), true);

        let s1 = store.get("s1").unwrap();
        assert_eq!(s1.last_message.as_deref(), Some("second"));
        assert_eq!(s1.unread_count, 2);
    }

    #[test]
    fn test_zero_and_restore_never_negative() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(vec![summary("s1", 3, 10)], &LoadGuard::default());

        assert_eq!(store.zero_unread("s1"), 3);
        assert_eq!(store.zero_unread("s1"), 0);
        assert_eq!(store.zero_unread("missing"), 0);
        assert_eq!(store.total_unread(), 0);

        store.upsert_from_push("s1", &text("s1", "me", "meanwhile", 11), true);
        assert!(store.restore_unread("s1", 3));
        assert_eq!(store.unread_for("s1"), 4);
        assert!(!store.restore_unread("missing", 1));
        assert_derived(&store);
    }

    #[test]
    fn test_remove_and_reinsert_at_position() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        store.load(
            vec![summary("a", 0, 30), summary("b", 5, 20), summary("c", 1, 10)],
            &LoadGuard::default(),
        );

        let (index, removed) = store.remove("b").unwrap();
        assert_eq!(index, 1);
        assert_eq!(store.total_unread(), 1);

        store.reinsert(index, removed);
        let peers: Vec<&str> = store.conversations().iter().map(|c| c.peer.as_str()).collect();
        assert_eq!(peers, vec!["a", "b", "c"]);
        assert_eq!(store.unread_for("b"), 5);
        assert_eq!(store.total_unread(), 6);
    }

    #[test]
    fn test_echo_matches_only_within_window() {
        let mut store = ConversationStore::new(ECHO_WINDOW_MS);
        let sent = Message::optimistic("me", "s1", Payload::Text("hi".into()), 1_000);
        let local_id = sent.local_id;
        store.record_local_send(&sent, 1_000);

        let echo = text("me", "s1", "hi", 1_500);
        assert_eq!(store.take_echo(&echo, 1_800), local_id);
        // Consumed: a second identical event is not an echo.
        assert_eq!(store.take_echo(&echo, 1_900), None);

        store.record_local_send(&sent, 5_000);
        assert_eq!(store.take_echo(&echo, 5_000 + ECHO_WINDOW_MS + 1), None);
    }
}
