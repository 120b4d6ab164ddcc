//! Applier task: the single consumer of the consensus apply stream and the
//! only write path into the state machine and dedup table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::consensus::{
    ApplyMsg, ApplyReceiver, ConsensusLog, LogIndex, NodeId, Term,
};
use crate::server::external::{CommandArgs, CommandOp, CommandReply, ReplyErr};
use crate::server::replica::{KvReplica, Shared};

impl KvReplica {
    /// Long-lived task consuming the apply stream. Exits when the stream
    /// closes (consensus gone) or the dead flag is raised.
    pub(crate) async fn applier_task(
        me: NodeId,
        snapshot_threshold: i64,
        consensus: Arc<dyn ConsensusLog>,
        shared: Arc<RwLock<Shared>>,
        dead: Arc<AtomicBool>,
        mut apply_rx: ApplyReceiver,
    ) {
        pf_debug!(me; "applier task spawned");

        while let Some(msg) = apply_rx.recv().await {
            if dead.load(Ordering::SeqCst) {
                break;
            }
            match msg {
                ApplyMsg::Command { index, term, data } => {
                    Self::apply_committed(me, &consensus, &shared, index, term, data);

                    // hand consensus a snapshot once its persisted state
                    // outgrows the configured threshold
                    if snapshot_threshold >= 0
                        && consensus.state_size() > snapshot_threshold as usize
                    {
                        match Self::encode_snapshot(&shared) {
                            Ok(bytes) => {
                                pf_debug!(me; "snapshotting at index {} ({} bytes)",
                                              index, bytes.len());
                                consensus.save_snapshot(index, bytes);
                            }
                            Err(e) => {
                                pf_error!(me; "error encoding snapshot: {}", e);
                            }
                        }
                    }
                }

                ApplyMsg::Snapshot { index, data, .. } => {
                    if let Err(e) = Self::install_snapshot(me, &shared, index, &data)
                    {
                        pf_error!(me; "error installing snapshot: {}", e);
                    }
                }
            }
        }

        pf_debug!(me; "applier task exited");
    }

    /// Applies one committed entry, then wakes the local waiter if this
    /// node is still leader at the entry's term. The write lock covers only
    /// the mutation; delivery happens under a read lock since the
    /// rendezvous send is non-blocking.
    fn apply_committed(
        me: NodeId,
        consensus: &Arc<dyn ConsensusLog>,
        shared: &Arc<RwLock<Shared>>,
        index: LogIndex,
        term: Term,
        data: Vec<u8>,
    ) {
        let reply = {
            let mut shared = shared.write().unwrap();
            if index <= shared.last_applied {
                // already covered by a snapshot; replay is normal
                pf_trace!(me; "discarding replayed entry at index {}", index);
                return;
            }
            shared.last_applied = index;

            let args: CommandArgs = match rmp_serde::from_slice(&data) {
                Ok(args) => args,
                Err(e) => {
                    pf_warn!(me; "skipping undecodable entry at index {}: {}",
                                 index, e);
                    return;
                }
            };
            let CommandArgs {
                op,
                key,
                value,
                client_id,
                command_id,
            } = args;

            if op != CommandOp::Get
                && shared.sessions.is_duplicate(client_id, command_id)
            {
                // a retry that lost the race with its own earlier apply;
                // reuse the recorded reply without touching the store
                pf_trace!(me; "entry at index {} is a duplicate of ({}, {})",
                              index, client_id, command_id);
                shared
                    .sessions
                    .recorded_reply(client_id)
                    .cloned()
                    .unwrap_or_else(|| CommandReply::ok(""))
            } else {
                let reply = match op {
                    CommandOp::Get => match shared.kv.get(&key) {
                        Some(value) => CommandReply::ok(value),
                        None => CommandReply::failed(ReplyErr::NoKey),
                    },
                    CommandOp::Put => {
                        shared.kv.put(key, value);
                        CommandReply::ok("")
                    }
                    CommandOp::Append => {
                        shared.kv.append(key, &value);
                        CommandReply::ok("")
                    }
                };
                if op != CommandOp::Get {
                    shared.sessions.record(client_id, command_id, reply.clone());
                }
                reply
            }
        };

        // only the leader can have a local waiter for this index; skipping
        // delivery on followers saves a map lookup per applied entry
        let (curr_term, is_leader) = consensus.leader_state();
        if is_leader && curr_term == term {
            shared.read().unwrap().waits.deliver(index, reply);
        }
    }
}
