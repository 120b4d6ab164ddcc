//! Client-facing wire surface: command records, replies, and the service
//! seam an RPC transport plugs into.

use crate::utils::RepliKvError;

use async_trait::async_trait;

use serde::{Deserialize, Serialize};

/// Operation kind carried by a command record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOp {
    /// Read the value of a key.
    Get,

    /// Unconditionally replace the value of a key.
    Put,

    /// Concatenate to the value of a key (absent key reads as empty).
    Append,
}

/// Command record: the unit submitted to consensus and replicated through
/// the log. `client_id` and `command_id` together identify retries of the
/// same logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub op: CommandOp,
    pub key: String,

    /// Empty for Get.
    pub value: String,

    /// Random per-session identifier, stable across retries and failover.
    pub client_id: u64,

    /// Monotonic within a client session; advanced only after success.
    pub command_id: u64,
}

/// Error vocabulary surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyErr {
    Ok,

    /// Get on an absent key; OK-class, the client treats it as empty.
    NoKey,

    /// This node did not accept the submission; try another server.
    WrongLeader,

    /// Accepted but not applied within the RPC deadline; the command may
    /// still commit later.
    Timeout,
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    /// Get result; empty for Put/Append and for missing keys.
    pub value: String,

    pub err: ReplyErr,
}

impl CommandReply {
    /// Successful reply carrying `value`.
    pub fn ok(value: impl Into<String>) -> Self {
        CommandReply {
            value: value.into(),
            err: ReplyErr::Ok,
        }
    }

    /// Valueless reply with the given error kind.
    pub fn failed(err: ReplyErr) -> Self {
        CommandReply {
            value: String::new(),
            err,
        }
    }
}

/// Service seam between clients and a replica. The in-process replica
/// handle implements it directly; a network transport would proxy it. A
/// transport-level `Err` is equivalent to `ReplyErr::Timeout` from the
/// client's point of view.
#[async_trait]
pub trait KvService: Send + Sync {
    async fn command(&self, args: CommandArgs)
        -> Result<CommandReply, RepliKvError>;
}
