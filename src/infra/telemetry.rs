use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "reelcache_cache_hit_total",
            Unit::Count,
            "Resolutions answered from the fast cache, by family."
        );
        describe_counter!(
            "reelcache_cache_miss_total",
            Unit::Count,
            "Resolutions that missed the fast cache, by family."
        );
        describe_counter!(
            "reelcache_origin_fetch_total",
            Unit::Count,
            "Catalog requests sent to the origin, by family."
        );
        describe_counter!(
            "reelcache_coalesced_wait_total",
            Unit::Count,
            "Callers that joined an in-flight resolution instead of starting one."
        );
        describe_counter!(
            "reelcache_blob_tier_total",
            Unit::Count,
            "Blob resolutions by the tier that produced the bytes."
        );
        describe_histogram!(
            "reelcache_origin_fetch_ms",
            Unit::Milliseconds,
            "Origin round-trip time for successful fetches in milliseconds."
        );
        describe_histogram!(
            "reelcache_sweep_ms",
            Unit::Milliseconds,
            "Reconciliation sweep duration in milliseconds."
        );
    });
}
