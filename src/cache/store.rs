//! Fast-cache contract and the in-process implementation.
//!
//! The fast cache maps keys to opaque bytes with a TTL and additionally keeps
//! TTL-bound string sets used as tag memberships. Every caller treats errors
//! from this layer as a miss.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::clock::{Clock, SystemClock};
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("fast cache backend failed: {0}")]
    Backend(String),
    #[error("fast cache key `{key}` holds a value of another type")]
    WrongType { key: String },
}

#[async_trait]
pub trait FastCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Adds `member` to the set at `key` and refreshes the set's TTL.
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Current members; empty when the set is absent or expired.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;
}

// ============================================================================
// In-process implementation
// ============================================================================

#[derive(Debug, Clone)]
enum SlotValue {
    Bytes(Bytes),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: SlotValue,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// TTL map guarded by a single lock. Expired slots are invisible to readers;
/// writes drop them at most once per `PURGE_INTERVAL`.
pub struct MemoryCache {
    slots: RwLock<HashMap<String, Slot>>,
    next_purge: Mutex<Instant>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_purge: Mutex::new(clock.now() + PURGE_INTERVAL),
            clock,
        }
    }

    /// Number of stored slots, expired ones included.
    pub fn slot_count(&self) -> usize {
        rw_read(&self.slots, SOURCE, "slot_count").len()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        rw_read(&self.slots, SOURCE, "len")
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired slot.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = rw_write(&self.slots, SOURCE, "purge_expired");
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    /// Called with the write lock held.
    fn purge_if_due(&self, slots: &mut HashMap<String, Slot>, now: Instant) {
        let mut next_purge = mutex_lock(&self.next_purge, SOURCE, "purge_if_due");
        if now < *next_purge {
            return;
        }
        slots.retain(|_, slot| slot.is_live(now));
        *next_purge = now + PURGE_INTERVAL;
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = self.clock.now();
        let slots = rw_read(&self.slots, SOURCE, "get");
        match slots.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(None),
            Some(Slot {
                value: SlotValue::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(CacheError::WrongType { key: key.into() }),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut slots = rw_write(&self.slots, SOURCE, "set");
        self.purge_if_due(&mut slots, now);
        slots.insert(
            key.to_string(),
            Slot {
                value: SlotValue::Bytes(value),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut slots = rw_write(&self.slots, SOURCE, "add_to_set");
        self.purge_if_due(&mut slots, now);
        let slot = slots
            .entry(key.to_string())
            .and_modify(|slot| {
                if !slot.is_live(now) {
                    slot.value = SlotValue::Set(BTreeSet::new());
                }
            })
            .or_insert_with(|| Slot {
                value: SlotValue::Set(BTreeSet::new()),
                expires_at: now,
            });

        match &mut slot.value {
            SlotValue::Set(members) => {
                members.insert(member.to_string());
                slot.expires_at = now + ttl;
                Ok(())
            }
            SlotValue::Bytes(_) => Err(CacheError::WrongType { key: key.into() }),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let now = self.clock.now();
        let slots = rw_read(&self.slots, SOURCE, "set_members");
        match slots.get(key).filter(|slot| slot.is_live(now)) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: SlotValue::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(CacheError::WrongType { key: key.into() }),
        }
    }
}
