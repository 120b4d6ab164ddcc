//! In-process consensus cluster honoring the `ConsensusLog` contract.
//!
//! `LocalNet` keeps one committed log shared by all nodes of a
//! single-process cluster and fans committed entries out to each live
//! node's apply stream. Leadership is designated rather than elected, and
//! the test-facing knobs (`elect`, `crash`, `hold_commits`) reproduce the
//! failure shapes the coordinator must survive: leader changes that discard
//! uncommitted entries, nodes restarting from a persisted snapshot, and
//! accepted submissions that never commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::consensus::api::{
    ApplyMsg, ApplyReceiver, ConsensusLog, LogIndex, NodeId, Submission, Term,
};

use tokio::sync::mpsc;

/// Fixed per-entry overhead charged by `state_size` on top of payload bytes.
const ENTRY_OVERHEAD: usize = 16;

/// One accepted log entry.
struct Entry {
    term: Term,
    data: Vec<u8>,
}

/// Per-node bookkeeping: liveness, apply stream, and persisted snapshot.
struct NodeSlot {
    /// Whether the node currently participates in the cluster.
    alive: bool,

    /// Sender half of the node's apply stream; `None` while crashed.
    apply_tx: Option<mpsc::UnboundedSender<ApplyMsg>>,

    /// Highest log index already delivered on the apply stream.
    delivered: LogIndex,

    /// Index covered by the node's persisted snapshot (0 = none).
    snap_index: LogIndex,

    /// Persisted snapshot bytes, if any.
    snapshot: Option<Vec<u8>>,
}

/// Cluster-wide shared state.
struct NetState {
    term: Term,
    leader: Option<NodeId>,

    /// While true, accepted entries are withheld from commitment.
    commits_held: bool,

    /// Global log, 1-based indices. Never truncated; per-node truncation is
    /// tracked through `snap_index`.
    log: Vec<Entry>,

    /// Commit point; entries at or below it are fanned out to live nodes.
    committed: LogIndex,

    nodes: Vec<NodeSlot>,
}

impl NetState {
    /// Term of the entry at `index` (0 for the sentinel index 0).
    fn term_of(&self, index: LogIndex) -> Term {
        if index == 0 {
            0
        } else {
            self.log[index as usize - 1].term
        }
    }

    /// Advances the commit point (unless held) and fans out newly committed
    /// entries to every live node.
    fn advance(&mut self) {
        if !self.commits_held {
            self.committed = self.log.len() as LogIndex;
        }
        for id in 0..self.nodes.len() {
            self.catch_up(id as NodeId);
        }
    }

    /// Delivers committed entries the node has not seen yet.
    fn catch_up(&mut self, id: NodeId) {
        if !self.nodes[id as usize].alive {
            return;
        }
        while self.nodes[id as usize].delivered < self.committed {
            let index = self.nodes[id as usize].delivered + 1;
            let entry = &self.log[index as usize - 1];
            let msg = ApplyMsg::Command {
                index,
                term: entry.term,
                data: entry.data.clone(),
            };
            let slot = &mut self.nodes[id as usize];
            match slot.apply_tx.as_ref() {
                Some(tx) if tx.send(msg).is_ok() => slot.delivered = index,
                _ => {
                    // consumer gone; stop delivering until next launch
                    slot.apply_tx = None;
                    return;
                }
            }
        }
    }
}

/// Handle to an in-process cluster of `LocalLog` nodes.
pub struct LocalNet {
    state: Arc<Mutex<NetState>>,
}

impl LocalNet {
    /// Creates a cluster of `population` nodes with node 0 designated
    /// leader at term 1. Nodes still need `launch()` to start delivering.
    pub fn new(population: u8) -> Self {
        let nodes = (0..population)
            .map(|_| NodeSlot {
                alive: false,
                apply_tx: None,
                delivered: 0,
                snap_index: 0,
                snapshot: None,
            })
            .collect();
        LocalNet {
            state: Arc::new(Mutex::new(NetState {
                term: 1,
                leader: Some(0),
                commits_held: false,
                log: Vec::new(),
                committed: 0,
                nodes,
            })),
        }
    }

    /// Brings node `id` up (initially or after a crash), returning its
    /// consensus handle and a fresh apply stream. The stream replays the
    /// persisted snapshot first, then every committed entry past it.
    pub fn launch(&self, id: NodeId) -> (Arc<LocalLog>, ApplyReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut net = self.state.lock().unwrap();
            let snap_index = net.nodes[id as usize].snap_index;
            let snap_term = net.term_of(snap_index);
            let slot = &mut net.nodes[id as usize];
            slot.alive = true;
            slot.delivered = snap_index;
            if let Some(snapshot) = slot.snapshot.clone() {
                // delivery on a fresh unbounded channel cannot fail
                let _ = tx.send(ApplyMsg::Snapshot {
                    index: snap_index,
                    term: snap_term,
                    data: snapshot,
                });
            }
            slot.apply_tx = Some(tx);
            net.catch_up(id);
        }
        let handle = Arc::new(LocalLog {
            id,
            state: Arc::clone(&self.state),
            killed: AtomicBool::new(false),
        });
        (handle, rx)
    }

    /// Designates `id` as leader for a new term. Entries accepted but not
    /// yet committed are discarded, as a real leader change may do.
    pub fn elect(&self, id: NodeId) {
        let mut net = self.state.lock().unwrap();
        let committed = net.committed as usize;
        net.log.truncate(committed);
        net.term += 1;
        net.leader = Some(id);
    }

    /// Takes node `id` out of the cluster; its apply stream closes. The
    /// node's persisted snapshot survives for a later `launch()`.
    pub fn crash(&self, id: NodeId) {
        let mut net = self.state.lock().unwrap();
        let slot = &mut net.nodes[id as usize];
        slot.alive = false;
        slot.apply_tx = None;
        if net.leader == Some(id) {
            net.leader = None;
        }
    }

    /// Withholds commitment of subsequently accepted entries.
    pub fn hold_commits(&self) {
        self.state.lock().unwrap().commits_held = true;
    }

    /// Resumes commitment and fans out everything that accumulated.
    pub fn release_commits(&self) {
        let mut net = self.state.lock().unwrap();
        net.commits_held = false;
        net.advance();
    }

    /// Currently designated leader, if any.
    pub fn leader(&self) -> Option<NodeId> {
        self.state.lock().unwrap().leader
    }

    /// Index covered by node `id`'s persisted snapshot (0 = none).
    pub fn snapshot_index(&self, id: NodeId) -> LogIndex {
        self.state.lock().unwrap().nodes[id as usize].snap_index
    }
}

/// One node's handle onto the shared cluster, implementing the contract the
/// coordinator consumes.
pub struct LocalLog {
    id: NodeId,
    state: Arc<Mutex<NetState>>,
    killed: AtomicBool,
}

impl ConsensusLog for LocalLog {
    fn submit(&self, data: Vec<u8>) -> Submission {
        if self.killed.load(Ordering::SeqCst) {
            return Submission::NotLeader;
        }
        let mut net = self.state.lock().unwrap();
        if net.leader != Some(self.id) || !net.nodes[self.id as usize].alive {
            return Submission::NotLeader;
        }
        let term = net.term;
        net.log.push(Entry { term, data });
        let index = net.log.len() as LogIndex;
        net.advance();
        Submission::Accepted { index, term }
    }

    fn leader_state(&self) -> (Term, bool) {
        let net = self.state.lock().unwrap();
        let is_leader = !self.killed.load(Ordering::SeqCst)
            && net.leader == Some(self.id)
            && net.nodes[self.id as usize].alive;
        (net.term, is_leader)
    }

    fn state_size(&self) -> usize {
        let net = self.state.lock().unwrap();
        let snap_index = net.nodes[self.id as usize].snap_index as usize;
        net.log[snap_index..]
            .iter()
            .map(|entry| entry.data.len() + ENTRY_OVERHEAD)
            .sum()
    }

    fn save_snapshot(&self, index: LogIndex, snapshot: Vec<u8>) {
        let mut net = self.state.lock().unwrap();
        let slot = &mut net.nodes[self.id as usize];
        if index <= slot.snap_index {
            return; // stale snapshot request
        }
        slot.snap_index = index;
        slot.snapshot = Some(snapshot);
    }

    fn read_snapshot(&self) -> Option<Vec<u8>> {
        let net = self.state.lock().unwrap();
        net.nodes[self.id as usize].snapshot.clone()
    }

    fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    fn me(&self) -> NodeId {
        self.id
    }
}
