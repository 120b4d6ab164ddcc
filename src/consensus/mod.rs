//! Consensus-layer contract consumed by the key/value coordinator, plus an
//! in-process implementation of it for single-process clusters and tests.

mod api;
mod local;

pub use api::{
    ApplyMsg, ApplyReceiver, ConsensusLog, LogIndex, NodeId, Submission, Term,
};
pub use local::{LocalLog, LocalNet};
