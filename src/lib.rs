//! Public interface to the replikv core library: the coordinator of a
//! linearizable replicated key/value service, layered atop a consensus log
//! consumed through the [`ConsensusLog`] contract.

#[macro_use]
mod utils;

mod client;
mod consensus;
mod server;

pub use client::Clerk;
pub use consensus::{
    ApplyMsg, ApplyReceiver, ConsensusLog, LocalLog, LocalNet, LogIndex,
    NodeId, Submission, Term,
};
pub use server::{
    CommandArgs, CommandOp, CommandReply, DedupTable, KvReplica,
    KvReplicaConfig, KvService, KvStore, LastOp, ReplyErr,
};
pub use utils::{parsed_config, RepliKvError};
