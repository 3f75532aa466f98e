//! Read-through / write-through resolution of catalog requests.
//!
//! Lookup order is fast cache, then (for item details) the durable store,
//! then the origin. Misses are coalesced per cache key so that concurrent
//! callers share one store lookup and at most one origin call.

use std::collections::HashMap;

use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    application::{context::PipelineContext, error::PipelineError},
    cache::RequestCoalescer,
    domain::{
        entities::{BlobReferences, CatalogDetail},
        normalize::{OriginShape, normalize},
        request::ResolutionRequest,
        types::{Family, PayloadKind},
    },
};

const TARGET: &str = "reelcache::application::resolver";

/// The `success/data` envelope. These exact bytes are what the fast cache
/// holds for a resolution key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,
    pub request_url: String,
    pub timestamp: i64,
}

impl Envelope {
    fn success(data: Option<Value>, request_url: String) -> Self {
        Self {
            success: true,
            data,
            error: None,
            raw_data: None,
            request_url,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    fn unrecognized(reason: String, raw: Value, request_url: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason),
            raw_data: Some(raw),
            request_url,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOrigin {
    Cache,
    Store,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub from_cache: bool,
    pub origin: ResolutionOrigin,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        self.envelope.success
    }
}

type Outcome = Result<Resolution, PipelineError>;

pub struct ReadThroughResolver {
    ctx: PipelineContext,
    in_flight: RequestCoalescer<Outcome>,
}

impl ReadThroughResolver {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            in_flight: RequestCoalescer::new(),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub async fn resolve(&self, request: &ResolutionRequest) -> Outcome {
        let key = request.cache_key();

        if let Some(envelope) = self.cached(&key).await {
            counter!("reelcache_cache_hit_total", "family" => request.family.prefix())
                .increment(1);
            return Ok(Resolution {
                envelope,
                from_cache: true,
                origin: ResolutionOrigin::Cache,
            });
        }
        counter!("reelcache_cache_miss_total", "family" => request.family.prefix()).increment(1);

        let miss = MissResolver {
            ctx: self.ctx.clone(),
        };
        let owned = request.clone();
        let (outcome, _) = self
            .in_flight
            .run(&key, || {
                let key = key.clone();
                async move { miss.resolve(&owned, &key).await }
            })
            .await?;
        outcome
    }

    /// Detail resolution by slug.
    pub async fn resolve_detail(&self, slug: &str) -> Outcome {
        let request = ResolutionRequest::detail(slug)
            .map_err(|err| PipelineError::not_found(err.to_string()))?;
        self.resolve(&request).await
    }

    async fn cached(&self, key: &str) -> Option<Envelope> {
        let bytes = match self.ctx.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(target = TARGET, cache_key = key, error = %err, "fast cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) if envelope.success => Some(envelope),
            Ok(_) => None,
            Err(err) => {
                debug!(
                    target = TARGET,
                    cache_key = key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                None
            }
        }
    }
}

/// Miss path for one key. Owns its context so it can outlive the caller
/// that started it.
struct MissResolver {
    ctx: PipelineContext,
}

impl MissResolver {
    async fn resolve(&self, request: &ResolutionRequest, key: &str) -> Outcome {
        let request_url = request.origin_url(&self.ctx.endpoints.api_base);
        let kind = request.family.payload_kind();

        let (shape, origin) = match self.stored_detail(request).await {
            Some(detail) => (OriginShape::Detail(Box::new(detail)), ResolutionOrigin::Store),
            None => {
                counter!("reelcache_origin_fetch_total", "family" => request.family.prefix())
                    .increment(1);
                let body = self.ctx.origin.fetch(&request_url).await.map_err(|err| {
                    warn!(
                        target = TARGET,
                        cache_key = key,
                        url = %request_url,
                        error = %err,
                        "origin fetch failed"
                    );
                    PipelineError::from(err)
                })?;
                (normalize(kind, &body), ResolutionOrigin::Api)
            }
        };

        let mut shape = match shape {
            OriginShape::Unrecognized { reason, raw } => {
                info!(
                    target = TARGET,
                    cache_key = key,
                    reason = %reason,
                    "origin payload unrecognized; returning soft failure"
                );
                return Ok(Resolution {
                    envelope: Envelope::unrecognized(reason, raw, request_url),
                    from_cache: false,
                    origin,
                });
            }
            recognized => recognized,
        };

        self.enrich(&mut shape).await;

        if origin == ResolutionOrigin::Api {
            self.write_through(kind, &shape).await.inspect_err(|err| {
                warn!(target = TARGET, cache_key = key, error = %err, "write-through failed");
            })?;
        }

        let envelope = Envelope::success(shape.data(), request_url);
        self.cache(request.family, key, &envelope).await;

        Ok(Resolution {
            envelope,
            from_cache: false,
            origin,
        })
    }

    /// Durable-store answer for detail requests. Records without episodes
    /// and read failures count as misses.
    async fn stored_detail(&self, request: &ResolutionRequest) -> Option<CatalogDetail> {
        if request.family != Family::Detail {
            return None;
        }

        match self.ctx.catalog.find_detail_by_slug(&request.subject).await {
            Ok(Some(detail)) if detail.episode_count() > 0 => Some(detail),
            Ok(Some(_)) => {
                debug!(
                    target = TARGET,
                    slug = %request.subject,
                    "stored item has no episodes; treating as miss"
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = TARGET,
                    slug = %request.subject,
                    error = %err,
                    "durable store lookup failed; treating as miss"
                );
                None
            }
        }
    }

    /// Overwrites blob references with the durable store's current values.
    async fn enrich(&self, shape: &mut OriginShape) {
        let ids = match shape {
            OriginShape::Listing(page) => page.item_ids(),
            OriginShape::Detail(detail) if !detail.movie.id.is_empty() => {
                vec![detail.movie.id.clone()]
            }
            _ => return,
        };
        if ids.is_empty() {
            return;
        }

        let references = match self.ctx.catalog.find_blob_references(&ids).await {
            Ok(references) => references,
            Err(err) => {
                warn!(target = TARGET, error = %err, "enrichment lookup failed; skipping");
                return;
            }
        };
        apply_blob_references(shape, &references);
    }

    async fn write_through(
        &self,
        kind: PayloadKind,
        shape: &OriginShape,
    ) -> Result<(), PipelineError> {
        let result = match (kind, shape) {
            (PayloadKind::Detail, OriginShape::Detail(detail)) => {
                self.ctx.catalog.save_detail(detail).await
            }
            (PayloadKind::Taxonomy(term_kind), OriginShape::Taxonomy(terms)) => {
                self.ctx.catalog.save_terms(term_kind, terms).await
            }
            _ => Ok(()),
        };
        result.map_err(|err| PipelineError::persistence(&err))
    }

    async fn cache(&self, family: Family, key: &str, envelope: &Envelope) {
        let bytes = match serde_json::to_vec(envelope) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                warn!(target = TARGET, cache_key = key, error = %err, "failed to encode envelope");
                return;
            }
        };

        if let Err(err) = self
            .ctx
            .cache
            .set(key, bytes, self.ctx.ttl.family_ttl(family))
            .await
        {
            warn!(target = TARGET, cache_key = key, error = %err, "fast cache write failed");
            return;
        }
        self.ctx.tags.add(&family.tag(), key).await;
    }
}

fn apply_blob_references(shape: &mut OriginShape, references: &[BlobReferences]) {
    let by_id: HashMap<&str, &BlobReferences> = references
        .iter()
        .map(|reference| (reference.id.as_str(), reference))
        .collect();

    match shape {
        OriginShape::Listing(page) => {
            for item in page.items.iter_mut() {
                let Some(object) = item.as_object_mut() else {
                    continue;
                };
                let Some(stored) = object
                    .get("_id")
                    .and_then(Value::as_str)
                    .and_then(|id| by_id.get(id))
                else {
                    continue;
                };
                if !stored.thumb_url.is_empty() {
                    object.insert("thumb_url".into(), Value::String(stored.thumb_url.clone()));
                }
                if !stored.poster_url.is_empty() {
                    object.insert(
                        "poster_url".into(),
                        Value::String(stored.poster_url.clone()),
                    );
                }
            }
        }
        OriginShape::Detail(detail) => {
            if let Some(stored) = by_id.get(detail.movie.id.as_str()) {
                if !stored.thumb_url.is_empty() {
                    detail.movie.thumb_url = stored.thumb_url.clone();
                }
                if !stored.poster_url.is_empty() {
                    detail.movie.poster_url = stored.poster_url.clone();
                }
            }
        }
        _ => {}
    }
}
