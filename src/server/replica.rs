//! Replica construction, configuration, and lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::consensus::{ApplyReceiver, ConsensusLog, LogIndex, NodeId};
use crate::server::dedup::DedupTable;
use crate::server::snapshot::SnapshotPayload;
use crate::server::statemach::KvStore;
use crate::server::waitreg::WaitRegistry;
use crate::utils::{parsed_config, RepliKvError};

use serde::Deserialize;

use tokio::time::Duration;

/// Configuration parameters struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KvReplicaConfig {
    /// Deadline for a command RPC to wait on its apply result, in millisecs.
    pub cmd_timeout_ms: u64,

    /// Lifetime of a pending rendezvous slot past its last acquire, in
    /// millisecs. Expired slots are swept lazily.
    pub wait_expiry_ms: u64,

    /// Persisted consensus state size, in bytes, beyond which the replica
    /// hands consensus a snapshot for log truncation. -1 disables
    /// snapshotting.
    pub snapshot_threshold: i64,
}

impl Default for KvReplicaConfig {
    fn default() -> Self {
        KvReplicaConfig {
            cmd_timeout_ms: 500,
            wait_expiry_ms: 1500,
            snapshot_threshold: -1,
        }
    }
}

impl KvReplicaConfig {
    pub(crate) fn cmd_timeout(&self) -> Duration {
        Duration::from_millis(self.cmd_timeout_ms)
    }

    pub(crate) fn wait_expiry(&self) -> Duration {
        Duration::from_millis(self.wait_expiry_ms)
    }
}

/// The coordinator's shared mutable state: one coherent unit behind a
/// single reader-writer lock. The applier task is the exclusive writer of
/// `kv`, `sessions`, and `last_applied`; command handlers write only
/// rendezvous slots. Guards are never held across an await or a blocking
/// channel operation.
pub(crate) struct Shared {
    pub kv: KvStore,
    pub sessions: DedupTable,
    pub waits: WaitRegistry,
    pub last_applied: LogIndex,
}

/// Key/value replica: funnels client commands through the consensus log,
/// applies committed entries exactly once, and snapshots for truncation.
pub struct KvReplica {
    /// Node ID, mirrored from the consensus module.
    pub(crate) me: NodeId,

    pub(crate) config: KvReplicaConfig,

    pub(crate) consensus: Arc<dyn ConsensusLog>,

    pub(crate) shared: Arc<RwLock<Shared>>,

    /// Set by `kill()`; observed by the applier and sweeper tasks.
    pub(crate) dead: Arc<AtomicBool>,
}

impl KvReplica {
    /// Creates a replica atop the given consensus handle and apply stream.
    /// Restores state from the persisted snapshot (if any) before the
    /// applier task starts consuming, then spawns the applier.
    pub async fn new_and_setup(
        consensus: Arc<dyn ConsensusLog>,
        apply_rx: ApplyReceiver,
        config_str: Option<&str>,
    ) -> Result<Self, RepliKvError> {
        let me = consensus.me();
        let config: KvReplicaConfig = parsed_config(config_str)?;
        if config.cmd_timeout_ms == 0 {
            return logged_err!(me; "invalid cmd_timeout_ms {}", config.cmd_timeout_ms);
        }
        if config.wait_expiry_ms < config.cmd_timeout_ms {
            return logged_err!(
                me;
                "wait_expiry_ms {} shorter than cmd_timeout_ms {}",
                config.wait_expiry_ms,
                config.cmd_timeout_ms
            );
        }

        let mut shared = Shared {
            kv: KvStore::new(),
            sessions: DedupTable::new(),
            waits: WaitRegistry::new(),
            last_applied: 0,
        };
        if let Some(bytes) = consensus.read_snapshot() {
            let payload = SnapshotPayload::decode(&bytes)?;
            pf_info!(me; "restored snapshot through index {}", payload.last_applied);
            shared.kv = payload.kv;
            shared.sessions = payload.sessions;
            shared.last_applied = payload.last_applied;
        }
        let shared = Arc::new(RwLock::new(shared));
        let dead = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::applier_task(
            me,
            config.snapshot_threshold,
            Arc::clone(&consensus),
            Arc::clone(&shared),
            Arc::clone(&dead),
            apply_rx,
        ));

        Ok(KvReplica {
            me,
            config,
            consensus,
            shared,
            dead,
        })
    }

    /// Shuts the replica down: raises the dead flag and kills consensus.
    /// The applier and sweepers observe the flag (or their closed channels)
    /// and exit on their next tick; in-flight RPCs may return any error.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
        self.consensus.kill();
        pf_info!(self.me; "replica killed");
    }

    /// This replica's node ID.
    pub fn me(&self) -> NodeId {
        self.me
    }

    /// Number of rendezvous slots currently pending. Drains to zero after
    /// quiescence once expiry sweeps run.
    pub fn pending_waits(&self) -> usize {
        self.shared.read().unwrap().waits.pending()
    }
}
