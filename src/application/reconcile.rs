//! Background revalidation sweeps.
//!
//! The tag sweep walks the keys registered under a listing family's tag and
//! re-resolves every listed item's detail, mirroring its thumbnail. The blob
//! sweep walks stored blob references and rewrites them to canonical blob
//! paths once the blob is mirrored.

use std::{collections::HashSet, fmt, sync::Arc, time::Instant};

use metrics::histogram;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    application::{
        blobs::BlobResolver,
        resolver::{Envelope, ReadThroughResolver},
    },
    domain::{
        blob::BlobPath,
        entities::BlobReferences,
        types::{BlobField, Family},
    },
};

const TARGET: &str = "reelcache::application::reconcile";

/// Per-sweep counters.
///
/// `scanned` counts items (tag sweep) or blob fields (blob sweep) examined,
/// `refreshed` successful re-resolutions, `updated` mirrored thumbnails or
/// rewritten references, `skipped` entries with nothing to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub refreshed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.scanned += other.scanned;
        self.refreshed += other.refreshed;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} refreshed={} updated={} skipped={} failed={}",
            self.scanned, self.refreshed, self.updated, self.skipped, self.failed
        )
    }
}

#[derive(Clone)]
pub struct Reconciler {
    resolver: Arc<ReadThroughResolver>,
    blobs: Arc<BlobResolver>,
}

impl Reconciler {
    pub fn new(resolver: Arc<ReadThroughResolver>, blobs: Arc<BlobResolver>) -> Self {
        Self { resolver, blobs }
    }

    pub async fn sweep_tag(&self, family: Family) -> SweepReport {
        let started = Instant::now();
        let ctx = self.resolver.context();
        let tag = family.tag();
        let mut report = SweepReport::default();
        let mut seen = HashSet::new();

        for key in ctx.tags.members(&tag).await {
            let Some(items) = self.cached_items(&key).await else {
                report.skipped += 1;
                continue;
            };

            for item in items {
                let Some(slug) = item.get("slug").and_then(Value::as_str) else {
                    report.skipped += 1;
                    continue;
                };
                if slug.is_empty() || !seen.insert(slug.to_string()) {
                    report.skipped += 1;
                    continue;
                }
                report.scanned += 1;
                self.refresh_item(slug, &mut report).await;
            }
        }

        finish("tag", &tag, started, report)
    }

    /// Sweeps every listing family in turn.
    pub async fn sweep_all_tags(&self) -> SweepReport {
        let mut total = SweepReport::default();
        for family in Family::LISTINGS {
            total.merge(self.sweep_tag(family).await);
        }
        total
    }

    pub async fn sweep_blobs(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let rows = match self.resolver.context().catalog.scan_blob_references().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(target = TARGET, error = %err, "blob reference scan failed");
                report.failed += 1;
                return finish("blob", "catalog_items", started, report);
            }
        };

        for row in &rows {
            for field in BlobField::ALL {
                report.scanned += 1;
                self.reconcile_reference(row, field, &mut report).await;
            }
        }

        finish("blob", "catalog_items", started, report)
    }

    async fn cached_items(&self, key: &str) -> Option<Vec<Value>> {
        let bytes = match self.resolver.context().cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(target = TARGET, cache_key = key, error = %err, "fast cache read failed");
                return None;
            }
        };
        let envelope: Envelope = serde_json::from_slice(&bytes).ok()?;
        match envelope.data? {
            Value::Object(mut data) => match data.remove("items") {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            },
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    async fn refresh_item(&self, slug: &str, report: &mut SweepReport) {
        let resolution = match self.resolver.resolve_detail(slug).await {
            Ok(resolution) if resolution.is_success() => resolution,
            Ok(resolution) => {
                debug!(
                    target = TARGET,
                    slug,
                    error = resolution.envelope.error.as_deref().unwrap_or_default(),
                    "detail resolved to a soft failure"
                );
                report.failed += 1;
                return;
            }
            Err(err) => {
                warn!(target = TARGET, slug, error = %err, "detail refresh failed");
                report.failed += 1;
                return;
            }
        };
        report.refreshed += 1;

        let thumb = resolution
            .envelope
            .data
            .as_ref()
            .and_then(|data| data.pointer("/movie/thumb_url"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        match BlobPath::from_reference(thumb) {
            Ok(Some(path)) => match self.blobs.resolve_path(path).await {
                Ok(_) => report.updated += 1,
                Err(err) => {
                    warn!(target = TARGET, slug, error = %err, "thumbnail mirror failed");
                    report.failed += 1;
                }
            },
            Ok(None) => {}
            Err(err) => {
                debug!(target = TARGET, slug, error = %err, "thumbnail reference skipped");
            }
        }
    }

    async fn reconcile_reference(
        &self,
        row: &BlobReferences,
        field: BlobField,
        report: &mut SweepReport,
    ) {
        let stored = match field {
            BlobField::Thumb => row.thumb_url.as_str(),
            BlobField::Poster => row.poster_url.as_str(),
        };

        let path = match BlobPath::from_reference(stored) {
            Ok(Some(path)) => path,
            Ok(None) => {
                report.skipped += 1;
                return;
            }
            Err(err) => {
                info!(
                    target = TARGET,
                    slug = %row.slug,
                    field = field.column(),
                    error = %err,
                    "skipping unrecognized blob reference"
                );
                report.skipped += 1;
                return;
            }
        };

        let object = match self.blobs.resolve_path(path).await {
            Ok(object) => object,
            Err(err) => {
                warn!(
                    target = TARGET,
                    slug = %row.slug,
                    field = field.column(),
                    error = %err,
                    "blob mirror failed"
                );
                report.failed += 1;
                return;
            }
        };
        report.refreshed += 1;

        if object.path.as_str() == stored {
            return;
        }
        match self
            .resolver
            .context()
            .catalog
            .update_blob_reference(&row.slug, field, object.path.as_str())
            .await
        {
            Ok(()) => report.updated += 1,
            Err(err) => {
                warn!(
                    target = TARGET,
                    slug = %row.slug,
                    field = field.column(),
                    error = %err,
                    "blob reference update failed"
                );
                report.failed += 1;
            }
        }
    }
}

fn finish(sweep: &'static str, scope: &str, started: Instant, report: SweepReport) -> SweepReport {
    let elapsed = started.elapsed();
    histogram!("reelcache_sweep_ms", "sweep" => sweep).record(elapsed.as_secs_f64() * 1000.0);
    info!(
        target = TARGET,
        sweep,
        scope,
        scanned = report.scanned,
        refreshed = report.refreshed,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "sweep finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_merge_field_by_field() {
        let mut total = SweepReport {
            scanned: 1,
            refreshed: 1,
            ..SweepReport::default()
        };
        total.merge(SweepReport {
            scanned: 2,
            failed: 1,
            ..SweepReport::default()
        });
        assert_eq!(
            total,
            SweepReport {
                scanned: 3,
                refreshed: 1,
                updated: 0,
                skipped: 0,
                failed: 1,
            }
        );
        assert_eq!(
            total.to_string(),
            "scanned=3 refreshed=1 updated=0 skipped=0 failed=1"
        );
    }
}
