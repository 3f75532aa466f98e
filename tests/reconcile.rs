mod support;

use bytes::Bytes;

use reelcache::{
    application::{reconcile::SweepReport, repos::CatalogRepo},
    domain::{
        entities::CatalogDetail,
        request::ResolutionRequest,
        types::Family,
    },
};

use support::{Harness, PNG_HEADER, detail_body, listing_item, newest_body};

fn stored_detail(id: &str, slug: &str, thumb: &str, poster: &str) -> CatalogDetail {
    let mut detail: CatalogDetail =
        serde_json::from_value(detail_body(id, slug, thumb, &["tap-1"])).unwrap();
    detail.movie.poster_url = poster.to_string();
    detail
}

#[tokio::test]
async fn tag_sweep_refreshes_listed_details_and_mirrors_thumbnails() {
    let harness = Harness::new();
    harness.origin.respond_json(
        "https://phimapi.com/danh-sach/phim-moi-cap-nhat?page=1",
        newest_body(vec![
            listing_item("a1", "tro-choi", "https://phimimg.com/upload/a1.jpg"),
            listing_item("a2", "hai-nguoi", "https://phimimg.com/upload/a2.jpg"),
            listing_item("a1", "tro-choi", "https://phimimg.com/upload/a1.jpg"),
        ]),
    );
    harness.origin.respond_json(
        "https://phimapi.com/phim/tro-choi",
        detail_body("a1", "tro-choi", "https://phimimg.com/upload/a1.jpg", &["tap-1"]),
    );
    harness.origin.respond_json(
        "https://phimapi.com/phim/hai-nguoi",
        serde_json::json!({ "status": false, "msg": "Movie not found" }),
    );
    harness.origin.respond(
        "https://phimimg.com/upload/a1.jpg",
        Bytes::from_static(PNG_HEADER),
    );

    let request = ResolutionRequest::new(Family::Newest, "phim-moi-cap-nhat").unwrap();
    harness.resolver.resolve(&request).await.unwrap();

    let report = harness.reconciler.sweep_tag(Family::Newest).await;

    assert_eq!(
        report,
        SweepReport {
            scanned: 2,
            refreshed: 1,
            updated: 1,
            skipped: 1,
            failed: 1,
        }
    );
    assert_eq!(harness.catalog.episode_count("a1"), 1);
    assert!(harness.blob_store.object("upload/a1.jpg").is_some());
}

#[tokio::test]
async fn tag_sweep_skips_expired_members_and_empty_tags() {
    let harness = Harness::new();
    harness.origin.respond_json(
        "https://phimapi.com/danh-sach/phim-moi-cap-nhat?page=1",
        newest_body(vec![listing_item("a1", "tro-choi", "")]),
    );
    let request = ResolutionRequest::new(Family::Newest, "phim-moi-cap-nhat").unwrap();
    harness.resolver.resolve(&request).await.unwrap();

    // Past both the tag TTL and the listing TTL.
    harness
        .clock
        .advance(std::time::Duration::from_secs(17 * 60 * 60));

    assert_eq!(
        harness.reconciler.sweep_all_tags().await,
        SweepReport::default()
    );
    assert_eq!(harness.origin.total_calls(), 1);
}

#[tokio::test]
async fn blob_sweep_rewrites_absolute_references_to_canonical_paths() {
    let harness = Harness::new();
    harness
        .catalog
        .save_detail(&stored_detail(
            "m1",
            "tro-choi",
            "https://phimimg.com/upload/m1.jpg",
            "upload/m1-poster.jpg",
        ))
        .await
        .unwrap();
    harness
        .catalog
        .save_detail(&stored_detail("m2", "hai-nguoi", "", "static/legacy.jpg"))
        .await
        .unwrap();
    harness.origin.respond(
        "https://phimimg.com/upload/m1.jpg",
        Bytes::from_static(PNG_HEADER),
    );
    harness.origin.respond(
        "https://phimimg.com/upload/m1-poster.jpg",
        Bytes::from_static(b"poster"),
    );
    let writes_before = harness.catalog.write_count();

    let report = harness.reconciler.sweep_blobs().await;

    assert_eq!(
        report,
        SweepReport {
            scanned: 4,
            refreshed: 2,
            updated: 1,
            skipped: 2,
            failed: 0,
        }
    );
    assert_eq!(harness.catalog.write_count(), writes_before + 1);
    assert_eq!(harness.blob_store.len(), 2);

    let references = harness
        .catalog
        .find_blob_references(&["m1".to_string()])
        .await
        .unwrap();
    assert_eq!(references[0].thumb_url, "upload/m1.jpg");
    assert_eq!(references[0].poster_url, "upload/m1-poster.jpg");
}

#[tokio::test]
async fn blob_sweep_counts_failed_mirrors() {
    let harness = Harness::new();
    harness
        .catalog
        .save_detail(&stored_detail("m1", "tro-choi", "upload/missing.jpg", ""))
        .await
        .unwrap();

    let report = harness.reconciler.sweep_blobs().await;

    assert_eq!(report.scanned, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.updated, 0);
}
