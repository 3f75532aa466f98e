use std::sync::Arc;

use crate::{
    application::{
        origin::OriginClient,
        repos::{BlobRepo, CatalogRepo},
    },
    cache::{CacheConfig, FastCache, TagIndex},
};

pub const DEFAULT_API_BASE: &str = "https://phimapi.com";
pub const DEFAULT_IMAGE_HOST: &str = "https://phimimg.com";

/// Base URLs of the catalog API and its image host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginEndpoints {
    pub api_base: String,
    pub image_host: String,
}

impl Default for OriginEndpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            image_host: DEFAULT_IMAGE_HOST.to_string(),
        }
    }
}

/// Every shared handle of the pipeline, passed explicitly into each component.
#[derive(Clone)]
pub struct PipelineContext {
    pub cache: Arc<dyn FastCache>,
    pub tags: TagIndex,
    pub catalog: Arc<dyn CatalogRepo>,
    pub blobs: Arc<dyn BlobRepo>,
    pub origin: Arc<dyn OriginClient>,
    pub ttl: CacheConfig,
    pub endpoints: OriginEndpoints,
}

impl PipelineContext {
    pub fn new(
        cache: Arc<dyn FastCache>,
        catalog: Arc<dyn CatalogRepo>,
        blobs: Arc<dyn BlobRepo>,
        origin: Arc<dyn OriginClient>,
        ttl: CacheConfig,
        endpoints: OriginEndpoints,
    ) -> Self {
        let tags = TagIndex::new(cache.clone(), ttl.tag_ttl());
        Self {
            cache,
            tags,
            catalog,
            blobs,
            origin,
            ttl,
            endpoints,
        }
    }
}
