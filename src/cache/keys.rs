//! Fast-cache key layout shared by the resolvers and the sweeps.
//!
//! Resolution keys come from [`ResolutionRequest::cache_key`] and tag keys
//! from [`Family::tag`]; this module owns the blob namespace.
//!
//! [`ResolutionRequest::cache_key`]: crate::domain::request::ResolutionRequest::cache_key
//! [`Family::tag`]: crate::domain::types::Family::tag

use crate::domain::blob::BlobPath;

pub const BLOB_KEY_PREFIX: &str = "image_cache";

pub fn blob_key(path: &BlobPath) -> String {
    format!("{BLOB_KEY_PREFIX}:{path}")
}
