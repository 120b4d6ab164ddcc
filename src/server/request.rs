//! Command RPC entrance.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::consensus::{LogIndex, Submission};
use crate::server::external::{
    CommandArgs, CommandOp, CommandReply, KvService, ReplyErr,
};
use crate::server::replica::KvReplica;
use crate::utils::RepliKvError;

use async_trait::async_trait;

use tokio::time;

#[async_trait]
impl KvService for KvReplica {
    /// Serves one client command: duplicate writes short-circuit to the
    /// cached reply, everything else goes through the consensus log and
    /// waits for the applier to deliver the result.
    async fn command(
        &self,
        args: CommandArgs,
    ) -> Result<CommandReply, RepliKvError> {
        // Gets never short-circuit: serving one from a stale cache could
        // travel back in time across a leader change.
        if args.op != CommandOp::Get {
            let shared = self.shared.read().unwrap();
            if shared.sessions.is_duplicate(args.client_id, args.command_id) {
                if let Some(reply) = shared.sessions.recorded_reply(args.client_id)
                {
                    pf_trace!(self.me; "duplicate write ({}, {}) answered from cache",
                                       args.client_id, args.command_id);
                    return Ok(reply.clone());
                }
            }
        }

        let record = rmp_serde::to_vec(&args)?;
        let index = match self.consensus.submit(record) {
            Submission::Accepted { index, .. } => index,
            Submission::NotLeader => {
                return Ok(CommandReply::failed(ReplyErr::WrongLeader));
            }
        };
        pf_debug!(self.me; "submitted ({}, {}) at index {}",
                           args.client_id, args.command_id, index);

        let mut result_rx = self
            .shared
            .write()
            .unwrap()
            .waits
            .acquire(index, self.config.wait_expiry());

        let reply = match time::timeout(self.config.cmd_timeout(), result_rx.recv())
            .await
        {
            Ok(Some(reply)) => reply,
            // deadline elapsed, or the slot was displaced; the entry may
            // still commit later and the client's retry will be deduped
            _ => CommandReply::failed(ReplyErr::Timeout),
        };

        self.spawn_sweeper(index);
        Ok(reply)
    }
}

impl KvReplica {
    /// Spawns the sweeper that reclaims the rendezvous slot at `index`
    /// once its expiry has elapsed.
    fn spawn_sweeper(&self, index: LogIndex) {
        let shared = Arc::clone(&self.shared);
        let dead = Arc::clone(&self.dead);
        let expiry = self.config.wait_expiry();
        tokio::spawn(async move {
            loop {
                time::sleep(expiry).await;
                if dead.load(Ordering::SeqCst) {
                    return;
                }
                if shared.write().unwrap().waits.collect(index) {
                    return;
                }
            }
        });
    }
}
