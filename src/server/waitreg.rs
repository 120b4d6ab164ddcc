//! Rendezvous between command submitters and the applier: a map from
//! pending log index to a single-shot result channel with an expiry stamp.

use std::collections::HashMap;

use crate::consensus::LogIndex;
use crate::server::external::CommandReply;

use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// One pending rendezvous slot.
struct WaitSlot {
    tx: mpsc::Sender<CommandReply>,
    expires_at: Instant,
}

/// Registry of pending result channels keyed by log index.
///
/// Channels have capacity 1 so the applier's non-blocking send lands in the
/// buffer even when the waiter has already departed; expired entries are
/// removed lazily by per-entry sweepers calling `collect`.
#[derive(Default)]
pub(crate) struct WaitRegistry {
    slots: HashMap<LogIndex, WaitSlot>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        WaitRegistry::default()
    }

    /// Installs a fresh capacity-1 channel for `index` and stamps its
    /// expiry `ttl` from now, returning the receiving half. A stale slot
    /// left behind by an earlier handler for a reused index (possible only
    /// across leader changes) is displaced; its waiter times out.
    pub fn acquire(&mut self, index: LogIndex, ttl: Duration) -> mpsc::Receiver<CommandReply> {
        let (tx, rx) = mpsc::channel(1);
        self.slots.insert(
            index,
            WaitSlot {
                tx,
                expires_at: Instant::now() + ttl,
            },
        );
        rx
    }

    /// Non-blocking delivery of `reply` to the waiter at `index`, if any.
    /// A departed receiver or an already-occupied buffer is not an error.
    pub fn deliver(&self, index: LogIndex, reply: CommandReply) {
        if let Some(slot) = self.slots.get(&index) {
            let _ = slot.tx.try_send(reply);
        }
    }

    /// Removes the slot at `index` if its expiry has elapsed. Returns true
    /// when no slot remains (removed now or already gone), telling the
    /// sweeper it can stop re-arming.
    pub fn collect(&mut self, index: LogIndex) -> bool {
        match self.slots.get(&index) {
            Some(slot) if Instant::now() >= slot.expires_at => {
                self.slots.remove(&index);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Number of pending slots.
    pub fn pending(&self) -> usize {
        self.slots.len()
    }
}
