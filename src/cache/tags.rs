//! Tag index: TTL-bound sets of cache keys, one per family.

use std::{sync::Arc, time::Duration};

use tracing::warn;

use super::store::FastCache;

#[derive(Clone)]
pub struct TagIndex {
    cache: Arc<dyn FastCache>,
    ttl: Duration,
}

impl TagIndex {
    pub fn new(cache: Arc<dyn FastCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Registers `key` under `tag` and refreshes the tag's TTL. Failures are
    /// logged; a missing membership only delays revalidation.
    pub async fn add(&self, tag: &str, key: &str) {
        if let Err(err) = self.cache.add_to_set(tag, key, self.ttl).await {
            warn!(
                target = "reelcache::cache::tags",
                tag,
                cache_key = key,
                error = %err,
                "failed to register cache key in tag"
            );
        }
    }

    /// Current members of `tag`; empty when absent, expired or unreadable.
    pub async fn members(&self, tag: &str) -> Vec<String> {
        match self.cache.set_members(tag).await {
            Ok(members) => members,
            Err(err) => {
                warn!(
                    target = "reelcache::cache::tags",
                    tag,
                    error = %err,
                    "failed to read tag members"
                );
                Vec::new()
            }
        }
    }
}
