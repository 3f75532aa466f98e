//! Fast-cache tier of the resolution pipeline.
//!
//! - [`FastCache`]: key→bytes with TTL plus TTL-bound string sets, backed by
//!   Redis in production ([`RedisCache`]) or an in-process map ([`MemoryCache`]).
//! - [`TagIndex`]: per-family sets of cached keys used by revalidation sweeps.
//! - [`RequestCoalescer`]: one in-flight resolution per key.
//!
//! TTLs come from a single table ([`CacheConfig`]), configured under `[cache]`:
//!
//! ```toml
//! [cache]
//! redis_url = "redis://127.0.0.1:6379"
//! listing_ttl_secs = 57600
//! blob_download_ttl_secs = 86400
//! # ... see config.rs for all options
//! ```

mod clock;
mod coalesce;
mod config;
mod keys;
mod lock;
mod redis;
mod store;
mod tags;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalesce::{Interrupted, RequestCoalescer, Role};
pub use config::CacheConfig;
pub use keys::{BLOB_KEY_PREFIX, blob_key};
pub use self::redis::RedisCache;
pub use store::{CacheError, FastCache, MemoryCache};
pub use tags::TagIndex;
