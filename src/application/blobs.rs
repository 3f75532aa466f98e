//! Three-tier blob resolution: fast cache, blob store, image host.

use bytes::Bytes;
use imagesize::ImageType;
use metrics::counter;
use tracing::{debug, warn};

use crate::{
    application::{context::PipelineContext, error::PipelineError},
    cache::{RequestCoalescer, blob_key},
    domain::blob::BlobPath,
};

const TARGET: &str = "reelcache::application::blobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobTier {
    Cache,
    Store,
    Origin,
}

impl BlobTier {
    fn as_str(self) -> &'static str {
        match self {
            BlobTier::Cache => "cache",
            BlobTier::Store => "store",
            BlobTier::Origin => "origin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub path: BlobPath,
    pub bytes: Bytes,
    pub content_type: String,
    pub tier: BlobTier,
}

impl BlobObject {
    fn new(path: BlobPath, bytes: Bytes, tier: BlobTier) -> Self {
        counter!("reelcache_blob_tier_total", "tier" => tier.as_str()).increment(1);
        let content_type = sniff_content_type(&path, &bytes);
        Self {
            path,
            bytes,
            content_type,
            tier,
        }
    }
}

type Outcome = Result<BlobObject, PipelineError>;

pub struct BlobResolver {
    ctx: PipelineContext,
    in_flight: RequestCoalescer<Outcome>,
}

impl BlobResolver {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            in_flight: RequestCoalescer::new(),
        }
    }

    /// Resolves a raw path. Invalid paths fail the same way as blobs that no
    /// tier can produce.
    pub async fn resolve(&self, raw_path: &str) -> Outcome {
        let path = BlobPath::parse(raw_path).map_err(|err| {
            debug!(target = TARGET, path = raw_path, error = %err, "rejected blob path");
            PipelineError::not_found(raw_path)
        })?;
        self.resolve_path(path).await
    }

    pub async fn resolve_path(&self, path: BlobPath) -> Outcome {
        let key = blob_key(&path);

        if let Some(bytes) = self.cached(&key).await {
            self.restore_if_missing(&path, &bytes).await;
            return Ok(BlobObject::new(path, bytes, BlobTier::Cache));
        }

        let miss = BlobMiss {
            ctx: self.ctx.clone(),
        };
        let (outcome, _) = self
            .in_flight
            .run(&key, || {
                let key = key.clone();
                async move { miss.resolve(path, &key).await }
            })
            .await?;
        outcome
    }

    async fn cached(&self, key: &str) -> Option<Bytes> {
        match self.ctx.cache.get(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(target = TARGET, cache_key = key, error = %err, "fast cache read failed");
                None
            }
        }
    }

    /// Re-uploads a cached blob whose stored copy has gone missing.
    async fn restore_if_missing(&self, path: &BlobPath, bytes: &Bytes) {
        match self.ctx.blobs.stat(path).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let content_type = sniff_content_type(path, bytes);
                if let Err(err) = self.ctx.blobs.put(path, bytes.clone(), &content_type).await {
                    warn!(target = TARGET, path = %path, error = %err, "blob restore failed");
                } else {
                    debug!(target = TARGET, path = %path, "restored blob from fast cache");
                }
            }
            Err(err) => {
                warn!(target = TARGET, path = %path, error = %err, "blob store stat failed");
            }
        }
    }
}

/// Store-then-origin lookup for one key. Owns its context so it can outlive
/// the caller that started it.
struct BlobMiss {
    ctx: PipelineContext,
}

impl BlobMiss {
    async fn resolve(&self, path: BlobPath, key: &str) -> Outcome {
        match self.ctx.blobs.get(&path).await {
            Ok(Some(bytes)) => {
                self.cache(key, bytes.clone(), BlobTier::Store).await;
                return Ok(BlobObject::new(path, bytes, BlobTier::Store));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(target = TARGET, path = %path, error = %err, "blob store read failed");
            }
        }

        let url = path.origin_url(&self.ctx.endpoints.image_host);
        let bytes = self.ctx.origin.fetch(&url).await.map_err(|err| {
            warn!(target = TARGET, path = %path, error = %err, "image host download failed");
            PipelineError::not_found(path.as_str())
        })?;

        let object = BlobObject::new(path, bytes, BlobTier::Origin);
        if let Err(err) = self
            .ctx
            .blobs
            .put(&object.path, object.bytes.clone(), &object.content_type)
            .await
        {
            warn!(target = TARGET, path = %object.path, error = %err, "blob store upload failed");
        }
        self.cache(key, object.bytes.clone(), BlobTier::Origin).await;
        Ok(object)
    }

    async fn cache(&self, key: &str, bytes: Bytes, tier: BlobTier) {
        let ttl = match tier {
            BlobTier::Store => self.ctx.ttl.blob_store_hit_ttl(),
            _ => self.ctx.ttl.blob_download_ttl(),
        };
        if let Err(err) = self.ctx.cache.set(key, bytes, ttl).await {
            warn!(target = TARGET, cache_key = key, error = %err, "fast cache write failed");
        }
    }
}

/// Magic bytes first, then the path extension, then a generic binary type.
pub fn sniff_content_type(path: &BlobPath, bytes: &[u8]) -> String {
    let sniffed = imagesize::image_type(bytes).ok().and_then(|kind| match kind {
        ImageType::Jpeg => Some("image/jpeg"),
        ImageType::Png => Some("image/png"),
        ImageType::Gif => Some("image/gif"),
        ImageType::Webp => Some("image/webp"),
        ImageType::Bmp => Some("image/bmp"),
        ImageType::Ico => Some("image/x-icon"),
        ImageType::Tiff => Some("image/tiff"),
        _ => None,
    });

    match sniffed {
        Some(mime) => mime.to_string(),
        None => mime_guess::from_path(path.as_str())
            .first_or_octet_stream()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
    ];

    fn path(raw: &str) -> BlobPath {
        BlobPath::parse(raw).unwrap()
    }

    #[test]
    fn magic_bytes_beat_extension() {
        assert_eq!(sniff_content_type(&path("a/poster.jpg"), PNG_HEADER), "image/png");
    }

    #[test]
    fn extension_is_the_fallback() {
        assert_eq!(sniff_content_type(&path("a/poster.jpg"), b"????"), "image/jpeg");
        assert_eq!(
            sniff_content_type(&path("a/poster"), b"????"),
            "application/octet-stream"
        );
    }
}
