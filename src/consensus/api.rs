//! Contract between the key/value coordinator and the consensus layer.
//!
//! The consensus algorithm (leader election, log replication, persistence)
//! is an external collaborator. The coordinator only relies on the narrow
//! surface below: a non-blocking submission call, an ordered apply stream,
//! and snapshot persistence hooks for log truncation.

use tokio::sync::mpsc;

/// Position of an entry in the replicated log, assigned on acceptance.
pub type LogIndex = u64;

/// Consensus term (election epoch) number.
pub type Term = u64;

/// Server node ID type.
pub type NodeId = u8;

/// Message delivered on the apply stream, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyMsg {
    /// A committed command record, to be applied to the state machine.
    Command {
        index: LogIndex,
        term: Term,
        data: Vec<u8>,
    },

    /// An installed snapshot superseding all entries at or below `index`.
    Snapshot {
        index: LogIndex,
        term: Term,
        data: Vec<u8>,
    },
}

/// Outcome of a log submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Entry accepted for replication at `index` during `term`. Acceptance
    /// is not commitment; the entry may still be lost to a leader change.
    Accepted { index: LogIndex, term: Term },

    /// This node is not the leader; nothing was enqueued.
    NotLeader,
}

/// Handle to a node's consensus module.
///
/// All methods are non-blocking; committed entries and snapshots arrive
/// asynchronously on the apply stream handed out alongside this handle
/// (an `mpsc::UnboundedReceiver<ApplyMsg>` consumed by a single task).
pub trait ConsensusLog: Send + Sync {
    /// Offers a command record for replication. Returns immediately.
    fn submit(&self, data: Vec<u8>) -> Submission;

    /// Current term and whether this node believes it is the leader.
    fn leader_state(&self) -> (Term, bool);

    /// Size in bytes of this node's persisted consensus state; input to the
    /// coordinator's snapshot trigger.
    fn state_size(&self) -> usize;

    /// Atomically persists consensus state through `index` alongside the
    /// snapshot bytes, allowing the log prefix to be discarded.
    fn save_snapshot(&self, index: LogIndex, snapshot: Vec<u8>);

    /// Latest persisted snapshot, if any. Read once at startup before the
    /// apply stream is consumed.
    fn read_snapshot(&self) -> Option<Vec<u8>>;

    /// Shuts down this node's consensus module.
    fn kill(&self);

    /// This node's ID.
    fn me(&self) -> NodeId;
}

/// Apply stream type handed to the coordinator at construction.
pub type ApplyReceiver = mpsc::UnboundedReceiver<ApplyMsg>;
