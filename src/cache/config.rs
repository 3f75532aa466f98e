//! TTL table for every cached artefact.
//!
//! One coherent table covers the resolution families, mirrored blobs and tag
//! memberships. Values are seconds in configuration and [`Duration`] at use.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::types::{Family, PayloadKind};

const HOUR: u64 = 60 * 60;
const DEFAULT_LISTING_TTL_SECS: u64 = 16 * HOUR;
const DEFAULT_DETAIL_TTL_SECS: u64 = 16 * HOUR;
const DEFAULT_TAXONOMY_TTL_SECS: u64 = 16 * HOUR;
const DEFAULT_BLOB_STORE_HIT_TTL_SECS: u64 = 6 * HOUR;
const DEFAULT_BLOB_DOWNLOAD_TTL_SECS: u64 = 24 * HOUR;
const DEFAULT_TAG_TTL_SECS: u64 = 12 * HOUR;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Listing, search, category, country and newest pages.
    pub listing_ttl_secs: u64,
    pub detail_ttl_secs: u64,
    /// Category and country term lists.
    pub taxonomy_ttl_secs: u64,
    /// Blob bytes recovered from the blob store.
    pub blob_store_hit_ttl_secs: u64,
    /// Blob bytes freshly downloaded from the image host.
    pub blob_download_ttl_secs: u64,
    /// Tag membership lists.
    pub tag_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl_secs: DEFAULT_LISTING_TTL_SECS,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            taxonomy_ttl_secs: DEFAULT_TAXONOMY_TTL_SECS,
            blob_store_hit_ttl_secs: DEFAULT_BLOB_STORE_HIT_TTL_SECS,
            blob_download_ttl_secs: DEFAULT_BLOB_DOWNLOAD_TTL_SECS,
            tag_ttl_secs: DEFAULT_TAG_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            listing_ttl_secs: settings.listing_ttl_secs,
            detail_ttl_secs: settings.detail_ttl_secs,
            taxonomy_ttl_secs: settings.taxonomy_ttl_secs,
            blob_store_hit_ttl_secs: settings.blob_store_hit_ttl_secs,
            blob_download_ttl_secs: settings.blob_download_ttl_secs,
            tag_ttl_secs: settings.tag_ttl_secs,
        }
    }
}

/// Zero would mean "never expires" for some backends; clamp to one second.
fn non_zero(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

impl CacheConfig {
    pub fn family_ttl(&self, family: Family) -> Duration {
        match family.payload_kind() {
            PayloadKind::Listing => non_zero(self.listing_ttl_secs),
            PayloadKind::Detail => non_zero(self.detail_ttl_secs),
            PayloadKind::Taxonomy(_) => non_zero(self.taxonomy_ttl_secs),
        }
    }

    pub fn blob_store_hit_ttl(&self) -> Duration {
        non_zero(self.blob_store_hit_ttl_secs)
    }

    pub fn blob_download_ttl(&self) -> Duration {
        non_zero(self.blob_download_ttl_secs)
    }

    pub fn tag_ttl(&self) -> Duration {
        non_zero(self.tag_ttl_secs)
    }
}
