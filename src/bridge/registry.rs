//! Pending-result registry
//!
//! Maps idempotency key → completion slot. Shared by waiting callers (register,
//! abandon) and the single result listener (fulfill, sweep); every transition
//! happens under the map's per-shard lock, so a fulfill racing an abandon on
//! the same key sees one consistent slot.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

use crate::saga::SagaOutcome;

enum Slot {
    /// Callers blocked on this key
    Waiting(Vec<(u64, oneshot::Sender<SagaOutcome>)>),
    /// Result arrived with nobody waiting; claimable until `at + grace`
    Completed { outcome: SagaOutcome, at: Instant },
}

/// Result of [`PendingRegistry::register`]
pub enum Registration {
    /// A retained result was waiting for this key
    Ready(SagaOutcome),
    Waiting(Waiter),
}

/// A registered caller's single-use slot
pub struct Waiter {
    key: String,
    id: u64,
    rx: oneshot::Receiver<SagaOutcome>,
}

impl Waiter {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn receiver(&mut self) -> &mut oneshot::Receiver<SagaOutcome> {
        &mut self.rx
    }
}

/// What [`PendingRegistry::fulfill`] did with a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to this many waiters
    Delivered(usize),
    /// Nobody was waiting; kept for the grace period
    Retained,
}

pub struct PendingRegistry {
    slots: DashMap<String, Slot>,
    grace_period: Duration,
    next_id: AtomicU64,
}

impl PendingRegistry {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            grace_period,
            next_id: AtomicU64::new(1),
        }
    }

    /// Register interest in `key`, or claim a retained result for it
    pub fn register(&self, key: &str) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Waiting(waiters) => waiters.push((id, tx)),
                Slot::Completed { outcome, at } => {
                    if at.elapsed() < self.grace_period {
                        let outcome = outcome.clone();
                        occupied.remove();
                        debug!(key = %key, "Retained result claimed");
                        return Registration::Ready(outcome);
                    }
                    occupied.insert(Slot::Waiting(vec![(id, tx)]));
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Waiting(vec![(id, tx)]));
            }
        }

        Registration::Waiting(Waiter {
            key: key.to_string(),
            id,
            rx,
        })
    }

    /// Route a result to every waiter on its key, or retain it
    pub fn fulfill(&self, key: &str, outcome: SagaOutcome) -> Delivery {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if let Slot::Waiting(waiters) = occupied.get_mut() {
                    let waiters = std::mem::take(waiters);
                    let delivered = waiters
                        .into_iter()
                        .filter(|(_, tx)| !tx.is_closed())
                        .map(|(_, tx)| tx.send(outcome.clone()))
                        .filter(Result::is_ok)
                        .count();
                    if delivered > 0 {
                        occupied.remove();
                        return Delivery::Delivered(delivered);
                    }
                } else {
                    debug!(key = %key, "Duplicate result replaces retained one");
                }
                occupied.insert(Slot::Completed {
                    outcome,
                    at: Instant::now(),
                });
                Delivery::Retained
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, "Result arrived before any waiter, retaining");
                vacant.insert(Slot::Completed {
                    outcome,
                    at: Instant::now(),
                });
                Delivery::Retained
            }
        }
    }

    /// Remove a waiter that gave up; the key's other waiters stay registered
    pub fn abandon(&self, waiter: &Waiter) {
        if let Entry::Occupied(mut occupied) = self.slots.entry(waiter.key.clone())
            && let Slot::Waiting(waiters) = occupied.get_mut()
        {
            waiters.retain(|(id, _)| *id != waiter.id);
            if waiters.is_empty() {
                occupied.remove();
            }
        }
    }

    /// Drop retained results older than the grace period
    pub fn sweep(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|key, slot| match slot {
            Slot::Completed { at, .. } if at.elapsed() >= self.grace_period => {
                debug!(key = %key, "Unclaimed result expired");
                false
            }
            _ => true,
        });
        before.saturating_sub(self.slots.len())
    }

    /// Keys currently tracked (waiting or retained)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
