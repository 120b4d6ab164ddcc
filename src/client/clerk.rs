//! Client session: retries commands across servers under a stable client
//! identity until one succeeds.

use std::sync::Arc;

use crate::server::{CommandArgs, CommandOp, CommandReply, KvService, ReplyErr};

use rand::rngs::OsRng;
use rand::Rng;

use tokio::task;

/// Client session identifiers are drawn from `[0, 2^62)`.
const CLIENT_NONCE_BOUND: u64 = 1 << 62;

/// A client session handle onto the service.
///
/// The session identity is the pair of a random `client_id`, fixed at
/// construction, and a `command_id` that advances only after a command has
/// observably succeeded. A retry therefore always carries the identifiers
/// of the original attempt, which is what lets the servers apply each write
/// at most once across arbitrary retries and leader changes.
pub struct Clerk {
    /// Service handles, one per server, in cluster order.
    servers: Vec<Arc<dyn KvService>>,

    /// Random session nonce from a cryptographic source.
    client_id: u64,

    /// Identifier of the next command; bumped only on success.
    command_id: u64,

    /// Index of the server believed to be leader.
    leader_hint: usize,
}

impl Clerk {
    /// Creates a new client session over the given servers.
    pub fn new(servers: Vec<Arc<dyn KvService>>) -> Self {
        assert!(!servers.is_empty());
        let leader_hint = OsRng.gen_range(0..servers.len());
        Clerk {
            servers,
            client_id: OsRng.gen_range(0..CLIENT_NONCE_BOUND),
            command_id: 0,
            leader_hint,
        }
    }

    /// Fetches the current value for a key; empty if the key does not
    /// exist. Keeps trying forever in the face of all other errors.
    pub async fn get(&mut self, key: impl Into<String>) -> String {
        self.command(CommandOp::Get, key.into(), String::new()).await
    }

    /// Replaces the value of a key.
    pub async fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.command(CommandOp::Put, key.into(), value.into()).await;
    }

    /// Appends to the value of a key.
    pub async fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.command(CommandOp::Append, key.into(), value.into()).await;
    }

    /// Runs one logical command to completion, rotating through servers on
    /// failure. Timeouts and transport errors rotate as well: either the
    /// command never committed, or it committed under a leader we lost
    /// touch with and the resend will be answered from the dedup cache.
    async fn command(&mut self, op: CommandOp, key: String, value: String) -> String {
        loop {
            let args = CommandArgs {
                op,
                key: key.clone(),
                value: value.clone(),
                client_id: self.client_id,
                command_id: self.command_id,
            };
            let outcome = self.servers[self.leader_hint].command(args).await;
            match outcome {
                Ok(CommandReply { value, err })
                    if err == ReplyErr::Ok || err == ReplyErr::NoKey =>
                {
                    pf_trace!(self.client_id; "command {} done via server {}",
                                              self.command_id, self.leader_hint);
                    self.command_id += 1;
                    return value;
                }
                Ok(CommandReply { err, .. }) => {
                    pf_debug!(self.client_id; "server {} answered {:?}, rotating",
                                              self.leader_hint, err);
                }
                Err(e) => {
                    pf_debug!(self.client_id; "server {} unreachable ({}), rotating",
                                              self.leader_hint, e);
                }
            }
            self.leader_hint = (self.leader_hint + 1) % self.servers.len();
            // rotation itself has no await point; yield so a single-threaded
            // runtime can run the servers we are probing
            task::yield_now().await;
        }
    }
}
