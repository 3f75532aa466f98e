//! Per-key request coalescing.
//!
//! The first caller for a key becomes the owner; its work runs on a spawned
//! task so the outcome is produced even if the owning caller is cancelled.
//! Every caller, owner included, receives the outcome over the group's
//! channel. The group is removed before the outcome is broadcast, so callers
//! arriving afterwards start a fresh execution.

use std::{future::Future, sync::Arc};

use dashmap::{DashMap, mapref::entry::Entry};
use metrics::counter;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// The work for an in-flight group ended without producing an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("in-flight resolution ended before completing")]
pub struct Interrupted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Waiter,
}

type Groups<T> = Arc<DashMap<String, broadcast::Sender<T>>>;

pub struct RequestCoalescer<T> {
    in_flight: Groups<T>,
}

impl<T> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
        }
    }
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<(T, Role), Interrupted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (mut receiver, role) = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(group) => (group.get().subscribe(), Role::Waiter),
            Entry::Vacant(slot) => {
                let (sender, receiver) = broadcast::channel(1);
                slot.insert(sender);
                (receiver, Role::Owner)
            }
        };

        match role {
            Role::Owner => {
                let flight = Flight {
                    groups: self.in_flight.clone(),
                    key: key.to_string(),
                    done: false,
                };
                let pending = work();
                tokio::spawn(async move {
                    let outcome = pending.await;
                    if let Some(sender) = flight.finish() {
                        // The owner's receiver may be gone if it was cancelled.
                        let _ = sender.send(outcome);
                    }
                });
            }
            Role::Waiter => {
                counter!("reelcache_coalesced_wait_total").increment(1);
                debug!(
                    target = "reelcache::cache::coalesce",
                    cache_key = key,
                    "joined in-flight resolution"
                );
            }
        }

        receiver
            .recv()
            .await
            .map(|outcome| (outcome, role))
            .map_err(|_| Interrupted)
    }
}

/// Removes the group when the work finishes or unwinds.
/// Dropping the sender wakes every receiver with a closed channel.
struct Flight<T> {
    groups: Groups<T>,
    key: String,
    done: bool,
}

impl<T> Flight<T> {
    fn finish(mut self) -> Option<broadcast::Sender<T>> {
        self.done = true;
        self.groups.remove(&self.key).map(|(_, sender)| sender)
    }
}

impl<T> Drop for Flight<T> {
    fn drop(&mut self) {
        if !self.done {
            self.groups.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tokio::sync::Notify;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let coalescer = Arc::new(RequestCoalescer::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = coalescer.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                coalescer
                    .run("k", || async move {
                        gate.notified().await;
                        calls.fetch_add(1, Ordering::SeqCst) + 41
                    })
                    .await
            }));
        }

        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        let mut owners = 0;
        for handle in handles {
            let (value, role) = handle.await.unwrap().unwrap();
            assert_eq!(value, 41);
            if role == Role::Owner {
                owners += 1;
            }
        }
        assert_eq!(owners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn completed_group_is_not_reused() {
        let coalescer = RequestCoalescer::<u32>::new();
        let (first, _) = coalescer.run("k", || async { 1 }).await.unwrap();
        let (second, role) = coalescer.run("k", || async { 2 }).await.unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(role, Role::Owner);
    }

    #[tokio::test]
    async fn cancelled_owner_still_delivers_to_waiters() {
        let coalescer = Arc::new(RequestCoalescer::<u32>::new());
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let owner = {
            let coalescer = coalescer.clone();
            let started = started.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                coalescer
                    .run("k", || async move {
                        started.notify_one();
                        gate.notified().await;
                        7
                    })
                    .await
            })
        };
        started.notified().await;

        let waiter = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move { coalescer.run("k", || async { 99 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());
        gate.notify_one();

        assert_eq!(waiter.await.unwrap(), Ok((7, Role::Waiter)));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_work_interrupts_every_caller() {
        let coalescer = Arc::new(RequestCoalescer::<u32>::new());
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let owner = {
            let coalescer = coalescer.clone();
            let started = started.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                coalescer
                    .run("k", || async move {
                        started.notify_one();
                        gate.notified().await;
                        panic!("work failed");
                    })
                    .await
            })
        };
        started.notified().await;

        let waiter = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move { coalescer.run("k", || async { 7 }).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert_eq!(owner.await.unwrap(), Err(Interrupted));
        assert_eq!(waiter.await.unwrap(), Err(Interrupted));
        assert_eq!(coalescer.in_flight(), 0);
    }
}
