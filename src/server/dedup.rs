//! Per-client retry suppression: cache of the last applied write and its
//! reply, keyed by client session.

use std::collections::BTreeMap;

use crate::server::external::CommandReply;

use serde::{Deserialize, Serialize};

/// Last applied write of one client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOp {
    pub command_id: u64,
    pub reply: CommandReply,
}

/// Cache of each client's last applied (command id, reply) pair.
///
/// Consulted before and updated after every Put/Append apply; Get never
/// touches it (re-reads must observe the latest committed value). Entries
/// are never evicted, so the table is bounded by active-client cardinality.
/// `BTreeMap` keeps the snapshot encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupTable {
    sessions: BTreeMap<u64, LastOp>,
}

impl DedupTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        DedupTable::default()
    }

    /// True iff the cached entry for `client_id` carries exactly
    /// `command_id`. A client advances its command id only after observing
    /// success, so an exact match is the only retry shape possible.
    pub fn is_duplicate(&self, client_id: u64, command_id: u64) -> bool {
        self.sessions
            .get(&client_id)
            .map(|last| last.command_id == command_id)
            .unwrap_or(false)
    }

    /// Reply cached for `client_id`, if any write was ever applied for it.
    pub fn recorded_reply(&self, client_id: u64) -> Option<&CommandReply> {
        self.sessions.get(&client_id).map(|last| &last.reply)
    }

    /// Installs the latest applied write of `client_id`, overwriting any
    /// prior entry.
    pub fn record(&mut self, client_id: u64, command_id: u64, reply: CommandReply) {
        self.sessions
            .insert(client_id, LastOp { command_id, reply });
    }

    /// Number of client sessions tracked.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod dedup_tests {
    use super::*;
    use crate::server::external::ReplyErr;

    #[test]
    fn unknown_client_is_not_duplicate() {
        let table = DedupTable::new();
        assert!(!table.is_duplicate(1, 0));
        assert_eq!(table.recorded_reply(1), None);
    }

    #[test]
    fn exact_command_id_match_only() {
        let mut table = DedupTable::new();
        table.record(1, 7, CommandReply::ok(""));
        assert!(table.is_duplicate(1, 7));
        assert!(!table.is_duplicate(1, 6));
        assert!(!table.is_duplicate(1, 8));
        assert!(!table.is_duplicate(2, 7));
    }

    #[test]
    fn record_overwrites_prior_entry() {
        let mut table = DedupTable::new();
        table.record(1, 7, CommandReply::ok("old"));
        table.record(1, 8, CommandReply::failed(ReplyErr::NoKey));
        assert!(!table.is_duplicate(1, 7));
        assert!(table.is_duplicate(1, 8));
        assert_eq!(
            table.recorded_reply(1),
            Some(&CommandReply::failed(ReplyErr::NoKey))
        );
        assert_eq!(table.len(), 1);
    }
}
