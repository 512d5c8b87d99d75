//! In-flight optimistic operations.
//!
//! Every optimistic change (mark-as-read, delete, send) is recorded here when it
//! is applied locally and removed when the server confirms it or when the
//! compensating change has been applied:
//!
//! ```text
//! Applied ──confirm──▶ Confirmed
//!    └────compensate──▶ Compensated
//! ```

use std::collections::{HashMap, HashSet};

use crate::models::{Conversation, LocalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Applied,
    Confirmed,
    Compensated,
}

/// What was changed locally, with enough information to undo it.
#[derive(Debug, Clone)]
pub enum OpKind {
    MarkRead {
        peer: String,
        previous_unread: u32,
    },
    Delete {
        index: usize,
        conversation: Conversation,
        was_open: bool,
    },
    Send {
        peer: String,
        local_id: LocalId,
    },
}

impl OpKind {
    pub fn peer(&self) -> &str {
        match self {
            OpKind::MarkRead { peer, .. } | OpKind::Send { peer, .. } => peer,
            OpKind::Delete { conversation, .. } => &conversation.peer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimisticOp {
    pub id: OpId,
    pub kind: OpKind,
    pub state: OpState,
}

#[derive(Debug, Default)]
pub struct InFlightLedger {
    next_id: u64,
    ops: HashMap<OpId, OptimisticOp>,
}

impl InFlightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, kind: OpKind) -> OpId {
        self.next_id += 1;
        let id = OpId(self.next_id);
        self.ops.insert(
            id,
            OptimisticOp {
                id,
                kind,
                state: OpState::Applied,
            },
        );
        id
    }

    /// The server accepted the change. Nothing to undo.
    pub fn confirm(&mut self, id: OpId) -> Option<OptimisticOp> {
        self.settle(id, OpState::Confirmed)
    }

    /// The server rejected the change. The caller applies the returned undo.
    pub fn compensate(&mut self, id: OpId) -> Option<OptimisticOp> {
        self.settle(id, OpState::Compensated)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn reads_in_flight(&self) -> HashSet<String> {
        self.peers_where(|kind| matches!(kind, OpKind::MarkRead { .. }))
    }

    pub fn deletes_in_flight(&self) -> HashSet<String> {
        self.peers_where(|kind| matches!(kind, OpKind::Delete { .. }))
    }

    fn peers_where(&self, predicate: impl Fn(&OpKind) -> bool) -> HashSet<String> {
        self.ops
            .values()
            .filter(|op| predicate(&op.kind))
            .map(|op| op.kind.peer().to_string())
            .collect()
    }

    fn settle(&mut self, id: OpId, state: OpState) -> Option<OptimisticOp> {
        let mut op = self.ops.remove(&id)?;
        op.state = state;
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_settle_once() {
        let mut ledger = InFlightLedger::new();
        let read = ledger.begin(OpKind::MarkRead {
            peer: "s1".into(),
            previous_unread: 2,
        });
        let send = ledger.begin(OpKind::Send {
            peer: "s2".into(),
            local_id: LocalId::new(),
        });

        assert_eq!(ledger.len(), 2);
        assert!(ledger.reads_in_flight().contains("s1"));
        assert!(ledger.deletes_in_flight().is_empty());

        let settled = ledger.compensate(read).unwrap();
        assert_eq!(settled.state, OpState::Compensated);
        assert!(ledger.confirm(read).is_none());

        assert_eq!(ledger.confirm(send).unwrap().state, OpState::Confirmed);
        assert!(ledger.is_empty());
    }
}
