//! reqwest-backed origin client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::histogram;
use reqwest::{
    Client,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue},
};
use tracing::debug;

use crate::{
    application::origin::{OriginClient, OriginError},
    infra::error::InfraError,
};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Plain GET client presenting itself as a desktop browser. Compressed
/// bodies are decoded transparently and no forwarding headers are sent.
#[derive(Clone, Debug)]
pub struct HttpOrigin {
    client: Client,
}

impl HttpOrigin {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("DNT", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::origin(err.to_string()))?;
        Ok(Self { client })
    }
}

fn classify(url: &str, err: reqwest::Error) -> OriginError {
    if err.is_timeout() {
        OriginError::Timeout {
            url: url.to_string(),
        }
    } else {
        OriginError::Unavailable {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl OriginClient for HttpOrigin {
    async fn fetch(&self, url: &str) -> Result<Bytes, OriginError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| classify(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|err| classify(url, err))?;
        let elapsed = started.elapsed();
        histogram!("reelcache_origin_fetch_ms").record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            target = "reelcache::infra::origin",
            url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "origin responded"
        );
        Ok(body)
    }
}
