use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use tracing::warn;

/// Recovers the guard from a poisoned lock. In-process adapters only hold
/// plain maps behind their locks, so a panic elsewhere leaves them readable.
fn recover<G>(
    poisoned: PoisonError<G>,
    owner: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        target = "reelcache::cache::lock",
        owner,
        op,
        lock_kind,
        "recovered poisoned in-process lock"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "rwlock.read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "rwlock.write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "mutex.lock"))
}
