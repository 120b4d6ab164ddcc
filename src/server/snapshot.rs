//! Snapshot encoding and installation for consensus log truncation.

use std::sync::{Arc, RwLock};

use crate::consensus::{LogIndex, NodeId};
use crate::server::dedup::DedupTable;
use crate::server::replica::{KvReplica, Shared};
use crate::server::statemach::KvStore;
use crate::utils::RepliKvError;

use serde::{Deserialize, Serialize};

/// Persisted snapshot payload: the full coordinator state below a log
/// index. Both maps are ordered, so identical states encode to identical
/// bytes regardless of the apply path that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SnapshotPayload {
    pub kv: KvStore,
    pub sessions: DedupTable,
    pub last_applied: LogIndex,
}

impl SnapshotPayload {
    pub fn decode(bytes: &[u8]) -> Result<Self, RepliKvError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl KvReplica {
    /// Serializes the current coordinator state for hand-off to consensus.
    pub(crate) fn encode_snapshot(
        shared: &Arc<RwLock<Shared>>,
    ) -> Result<Vec<u8>, RepliKvError> {
        let payload = {
            let shared = shared.read().unwrap();
            SnapshotPayload {
                kv: shared.kv.clone(),
                sessions: shared.sessions.clone(),
                last_applied: shared.last_applied,
            }
        };
        Ok(rmp_serde::to_vec(&payload)?)
    }

    /// Atomically replaces coordinator state from a snapshot delivered on
    /// the apply stream. Snapshots at or below `last_applied` are stale
    /// replays and are discarded.
    pub(crate) fn install_snapshot(
        me: NodeId,
        shared: &Arc<RwLock<Shared>>,
        index: LogIndex,
        bytes: &[u8],
    ) -> Result<(), RepliKvError> {
        let payload = SnapshotPayload::decode(bytes)?;
        let mut shared = shared.write().unwrap();
        if index <= shared.last_applied {
            pf_trace!(me; "discarding stale snapshot at index {}", index);
            return Ok(());
        }
        shared.kv = payload.kv;
        shared.sessions = payload.sessions;
        shared.last_applied = payload.last_applied;
        pf_info!(me; "installed snapshot through index {}", payload.last_applied);
        Ok(())
    }
}
