#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};

use reelcache::{
    application::{
        blobs::BlobResolver,
        context::{OriginEndpoints, PipelineContext},
        origin::{OriginClient, OriginError},
        reconcile::Reconciler,
        resolver::ReadThroughResolver,
    },
    cache::{CacheConfig, ManualClock, MemoryCache},
    infra::{blobs::MemoryBlobStore, memory::MemoryCatalog},
};

pub const API_BASE: &str = "https://phimapi.com";
pub const IMAGE_HOST: &str = "https://phimimg.com";

pub const PNG_HEADER: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00,
];

/// Origin double answering from a scripted url → response table.
#[derive(Default)]
pub struct FakeOrigin {
    routes: Mutex<HashMap<String, Result<Bytes, OriginError>>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
    delay: Mutex<Duration>,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), Ok(body.into()));
    }

    pub fn respond_json(&self, url: impl Into<String>, body: Value) {
        self.respond(url, serde_json::to_vec(&body).unwrap());
    }

    pub fn fail(&self, url: impl Into<String>, error: OriginError) {
        self.routes.lock().unwrap().insert(url.into(), Err(error));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == url)
            .count()
    }
}

#[async_trait]
impl OriginClient for FakeOrigin {
    async fn fetch(&self, url: &str) -> Result<Bytes, OriginError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(url.to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.routes.lock().unwrap().get(url).cloned();
        scripted.unwrap_or_else(|| {
            Err(OriginError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}

/// The whole pipeline wired to in-process adapters.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub cache: Arc<MemoryCache>,
    pub catalog: Arc<MemoryCatalog>,
    pub blob_store: Arc<MemoryBlobStore>,
    pub origin: Arc<FakeOrigin>,
    pub resolver: Arc<ReadThroughResolver>,
    pub blobs: Arc<BlobResolver>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let catalog = Arc::new(MemoryCatalog::new());
        let blob_store = Arc::new(MemoryBlobStore::new());
        let origin = Arc::new(FakeOrigin::new());

        let ctx = PipelineContext::new(
            cache.clone(),
            catalog.clone(),
            blob_store.clone(),
            origin.clone(),
            CacheConfig::default(),
            OriginEndpoints {
                api_base: API_BASE.to_string(),
                image_host: IMAGE_HOST.to_string(),
            },
        );
        let resolver = Arc::new(ReadThroughResolver::new(ctx.clone()));
        let blobs = Arc::new(BlobResolver::new(ctx));
        let reconciler = Reconciler::new(resolver.clone(), blobs.clone());

        Self {
            clock,
            cache,
            catalog,
            blob_store,
            origin,
            resolver,
            blobs,
            reconciler,
        }
    }
}

pub fn listing_item(id: &str, slug: &str, thumb: &str) -> Value {
    json!({
        "_id": id,
        "name": format!("Item {id}"),
        "slug": slug,
        "thumb_url": thumb,
        "poster_url": "",
        "year": 2024,
    })
}

/// Body in the `{ status, items, pagination }` layout of the newest list.
pub fn newest_body(items: Vec<Value>) -> Value {
    json!({
        "status": true,
        "items": items,
        "pagination": { "totalItems": 1, "totalItemsPerPage": 10, "currentPage": 1, "totalPages": 1 },
    })
}

/// Body in the `{ data: { items, params.pagination } }` layout of the v1 API.
pub fn v1_listing_body(items: Vec<Value>) -> Value {
    json!({
        "status": "success",
        "data": {
            "items": items,
            "params": { "pagination": { "currentPage": 1, "totalPages": 1 } },
        },
    })
}

pub fn detail_body(id: &str, slug: &str, thumb: &str, episodes: &[&str]) -> Value {
    let server_data: Vec<Value> = episodes
        .iter()
        .map(|episode| {
            json!({
                "name": episode,
                "slug": episode,
                "filename": format!("{slug} - {episode}"),
                "link_embed": format!("https://player.test/{slug}/{episode}"),
                "link_m3u8": format!("https://stream.test/{slug}/{episode}.m3u8"),
            })
        })
        .collect();

    json!({
        "status": true,
        "msg": "",
        "movie": {
            "_id": id,
            "name": format!("Item {id}"),
            "origin_name": "Origin Name",
            "slug": slug,
            "content": "Synopsis",
            "type": "series",
            "status": "completed",
            "thumb_url": thumb,
            "poster_url": "",
            "year": 2024,
            "quality": "FHD",
            "category": [{ "id": "c1", "name": "Hành Động", "slug": "hanh-dong" }],
            "country": [{ "id": "k1", "name": "Hàn Quốc", "slug": "han-quoc" }],
        },
        "episodes": [{ "server_name": "Vietsub #1", "server_data": server_data }],
    })
}
