mod support;

use std::time::Duration;

use futures::future::join_all;
use serde_json::json;

use reelcache::{
    application::{
        error::PipelineError,
        origin::OriginError,
        repos::CatalogRepo,
        resolver::ResolutionOrigin,
    },
    domain::{
        entities::CatalogDetail,
        request::ResolutionRequest,
        types::{Family, TermKind},
    },
};

use support::{Harness, detail_body, listing_item, newest_body, v1_listing_body};

const HOUR: Duration = Duration::from_secs(60 * 60);

fn newest(page: u32) -> ResolutionRequest {
    ResolutionRequest::new(Family::Newest, "phim-moi-cap-nhat")
        .unwrap()
        .with_page(page)
}

fn list(subject: &str) -> ResolutionRequest {
    ResolutionRequest::new(Family::List, subject).unwrap()
}

fn stored_detail(id: &str, slug: &str, thumb: &str, episodes: &[&str]) -> CatalogDetail {
    serde_json::from_value(detail_body(id, slug, thumb, episodes)).unwrap()
}

#[tokio::test]
async fn newest_list_is_fetched_once_then_served_from_cache() {
    let harness = Harness::new();
    let url = "https://phimapi.com/danh-sach/phim-moi-cap-nhat?page=1";
    harness.origin.respond_json(
        url,
        newest_body(vec![listing_item("a1", "tro-choi", "https://phimimg.com/upload/a1.jpg")]),
    );

    let first = harness.resolver.resolve(&newest(1)).await.unwrap();
    assert!(first.is_success());
    assert!(!first.from_cache);
    assert_eq!(first.origin, ResolutionOrigin::Api);
    assert_eq!(first.envelope.request_url, url);
    let data = first.envelope.data.clone().unwrap();
    assert_eq!(data["items"][0]["slug"], "tro-choi");
    assert_eq!(data["pagination"]["currentPage"], 1);

    let second = harness.resolver.resolve(&newest(1)).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.origin, ResolutionOrigin::Cache);
    assert_eq!(second.envelope, first.envelope);
    assert_eq!(harness.origin.calls_to(url), 1);
    assert_eq!(harness.catalog.write_count(), 0);
}

#[tokio::test]
async fn concurrent_misses_share_one_origin_call() {
    let harness = Harness::new();
    let request = list("phim-bo");
    let url = request.origin_url(support::API_BASE);
    harness.origin.respond_json(
        &url,
        v1_listing_body(vec![listing_item("b1", "bo-1", "")]),
    );
    harness.origin.set_delay(Duration::from_millis(50));

    let outcomes = join_all((0..8).map(|_| harness.resolver.resolve(&request))).await;

    assert_eq!(harness.origin.total_calls(), 1);
    let envelopes: Vec<_> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap().envelope)
        .collect();
    assert!(envelopes.iter().all(|envelope| envelope == &envelopes[0]));
}

#[tokio::test]
async fn concurrent_failures_are_shared_too() {
    let harness = Harness::new();
    let request = list("phim-le");
    let url = request.origin_url(support::API_BASE);
    harness.origin.fail(
        &url,
        OriginError::Timeout { url: url.clone() },
    );
    harness.origin.set_delay(Duration::from_millis(20));

    let outcomes = join_all((0..4).map(|_| harness.resolver.resolve(&request))).await;

    assert_eq!(harness.origin.total_calls(), 1);
    for outcome in outcomes {
        assert!(matches!(outcome, Err(PipelineError::OriginUnavailable { .. })));
    }
}

#[tokio::test]
async fn expired_entries_are_fetched_again() {
    let harness = Harness::new();
    let url = "https://phimapi.com/danh-sach/phim-moi-cap-nhat?page=2";
    harness
        .origin
        .respond_json(url, newest_body(vec![listing_item("a1", "tro-choi", "")]));

    harness.resolver.resolve(&newest(2)).await.unwrap();
    harness.clock.advance(15 * HOUR);
    assert!(harness.resolver.resolve(&newest(2)).await.unwrap().from_cache);

    harness.clock.advance(2 * HOUR);
    let refreshed = harness.resolver.resolve(&newest(2)).await.unwrap();
    assert_eq!(refreshed.origin, ResolutionOrigin::Api);
    assert_eq!(harness.origin.calls_to(url), 2);
}

#[tokio::test]
async fn detail_is_written_through_and_later_served_from_the_store() {
    let harness = Harness::new();
    let url = "https://phimapi.com/phim/tro-choi";
    harness.origin.respond_json(
        url,
        detail_body("m1", "tro-choi", "https://phimimg.com/upload/m1.jpg", &["tap-1", "tap-2"]),
    );

    let fetched = harness.resolver.resolve_detail("tro-choi").await.unwrap();
    assert_eq!(fetched.origin, ResolutionOrigin::Api);
    assert_eq!(harness.catalog.item_count(), 1);
    assert_eq!(harness.catalog.episode_count("m1"), 2);
    assert_eq!(harness.catalog.term_count(TermKind::Category), 1);
    assert_eq!(harness.catalog.term_count(TermKind::Country), 1);

    harness.clock.advance(17 * HOUR);
    let stored = harness.resolver.resolve_detail("tro-choi").await.unwrap();
    assert_eq!(stored.origin, ResolutionOrigin::Store);
    assert!(!stored.from_cache);
    assert_eq!(harness.origin.calls_to(url), 1);

    let data = stored.envelope.data.unwrap();
    assert_eq!(data["movie"]["_id"], "m1");
    assert_eq!(data["movie"]["quality"], "FHD");
    assert_eq!(data["episodes"][0]["server_data"][1]["slug"], "tap-2");

    let cached = harness.resolver.resolve_detail("tro-choi").await.unwrap();
    assert_eq!(cached.origin, ResolutionOrigin::Cache);
}

#[tokio::test]
async fn stored_detail_short_circuits_the_origin() {
    let harness = Harness::new();
    harness
        .catalog
        .save_detail(&stored_detail("m2", "hai-nguoi", "upload/m2.jpg", &["full"]))
        .await
        .unwrap();

    let resolution = harness.resolver.resolve_detail("hai-nguoi").await.unwrap();

    assert_eq!(resolution.origin, ResolutionOrigin::Store);
    assert_eq!(harness.origin.total_calls(), 0);
    assert_eq!(
        resolution.envelope.request_url,
        "https://phimapi.com/phim/hai-nguoi"
    );
}

#[tokio::test]
async fn stored_detail_without_episodes_falls_through_to_origin() {
    let harness = Harness::new();
    harness
        .catalog
        .save_detail(&stored_detail("m3", "sap-chieu", "", &[]))
        .await
        .unwrap();
    harness.origin.respond_json(
        "https://phimapi.com/phim/sap-chieu",
        detail_body("m3", "sap-chieu", "", &["tap-1"]),
    );

    let resolution = harness.resolver.resolve_detail("sap-chieu").await.unwrap();

    assert_eq!(resolution.origin, ResolutionOrigin::Api);
    assert_eq!(harness.origin.total_calls(), 1);
    assert_eq!(harness.catalog.episode_count("m3"), 1);
}

#[tokio::test]
async fn unrecognized_payload_is_a_soft_failure_that_is_not_cached() {
    let harness = Harness::new();
    let request = list("hoat-hinh");
    let url = request.origin_url(support::API_BASE);
    harness
        .origin
        .respond_json(&url, json!({ "status": false, "msg": "maintenance" }));

    let first = harness.resolver.resolve(&request).await.unwrap();
    assert!(!first.is_success());
    assert!(first.envelope.data.is_none());
    assert!(first.envelope.error.is_some());
    assert_eq!(first.envelope.raw_data.as_ref().unwrap()["msg"], "maintenance");

    let second = harness.resolver.resolve(&request).await.unwrap();
    assert!(!second.from_cache);
    assert_eq!(harness.origin.calls_to(&url), 2);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn persistence_failure_propagates_and_leaves_the_cache_untouched() {
    let harness = Harness::new();
    let url = "https://phimapi.com/phim/tro-choi";
    harness
        .origin
        .respond_json(url, detail_body("m1", "tro-choi", "", &["tap-1"]));
    harness.catalog.fail_writes(true);

    let failed = harness.resolver.resolve_detail("tro-choi").await;
    assert!(matches!(failed, Err(PipelineError::Persistence { .. })));
    assert!(harness.cache.is_empty());

    harness.catalog.fail_writes(false);
    let recovered = harness.resolver.resolve_detail("tro-choi").await.unwrap();
    assert_eq!(recovered.origin, ResolutionOrigin::Api);
    assert_eq!(harness.origin.calls_to(url), 2);
}

#[tokio::test]
async fn origin_failures_propagate_without_side_effects() {
    let harness = Harness::new();
    harness.origin.fail(
        "https://phimapi.com/phim/mat-tich",
        OriginError::Unavailable {
            url: "https://phimapi.com/phim/mat-tich".into(),
            message: "connection reset".into(),
        },
    );

    let unavailable = harness.resolver.resolve_detail("mat-tich").await;
    assert!(matches!(
        unavailable,
        Err(PipelineError::OriginUnavailable { .. })
    ));

    let missing = harness.resolver.resolve(&list("khong-co")).await;
    assert!(matches!(
        missing,
        Err(PipelineError::OriginBadResponse { status: 404, .. })
    ));

    assert!(harness.cache.is_empty());
    assert_eq!(harness.catalog.write_count(), 0);
}

#[tokio::test]
async fn stored_blob_references_replace_origin_urls() {
    let harness = Harness::new();
    harness
        .catalog
        .save_detail(&stored_detail("a1", "tro-choi", "upload/a1.jpg", &["tap-1"]))
        .await
        .unwrap();
    harness.origin.respond_json(
        "https://phimapi.com/danh-sach/phim-moi-cap-nhat?page=1",
        newest_body(vec![
            listing_item("a1", "tro-choi", "https://phimimg.com/upload/a1.jpg"),
            listing_item("a2", "moi", "https://phimimg.com/upload/a2.jpg"),
        ]),
    );

    let resolution = harness.resolver.resolve(&newest(1)).await.unwrap();
    let items = &resolution.envelope.data.unwrap()["items"];

    assert_eq!(items[0]["thumb_url"], "upload/a1.jpg");
    assert_eq!(items[0]["poster_url"], "");
    assert_eq!(items[1]["thumb_url"], "https://phimimg.com/upload/a2.jpg");
}

#[tokio::test]
async fn cached_keys_are_tagged_until_the_tag_expires() {
    let harness = Harness::new();
    let request = list("phim-bo");
    harness.origin.respond_json(
        request.origin_url(support::API_BASE),
        v1_listing_body(vec![listing_item("b1", "bo-1", "")]),
    );

    harness.resolver.resolve(&request).await.unwrap();
    harness.resolver.resolve(&request).await.unwrap();

    let tags = &harness.resolver.context().tags;
    assert_eq!(
        tags.members(&Family::List.tag()).await,
        vec![request.cache_key()]
    );
    assert!(tags.members(&Family::Search.tag()).await.is_empty());

    harness.clock.advance(13 * HOUR);
    assert!(tags.members(&Family::List.tag()).await.is_empty());
}

#[tokio::test]
async fn taxonomy_terms_are_persisted() {
    let harness = Harness::new();
    harness.origin.respond_json(
        "https://phimapi.com/the-loai",
        json!([
            { "_id": "c1", "name": "Hành Động", "slug": "hanh-dong" },
            { "_id": "c2", "name": "Tình Cảm", "slug": "tinh-cam" },
        ]),
    );

    let request = ResolutionRequest::taxonomy(Family::Categories).unwrap();
    let resolution = harness.resolver.resolve(&request).await.unwrap();

    assert_eq!(resolution.envelope.data.unwrap()[1]["slug"], "tinh-cam");
    assert_eq!(harness.catalog.term_count(TermKind::Category), 2);
    assert_eq!(request.cache_key(), "categories:all");
}

#[tokio::test]
async fn filters_containing_the_delimiter_get_their_own_entries() {
    let harness = Harness::new();
    let mut first = list("phim-bo");
    first.category = Some("c:d".into());
    let mut second = list("phim-bo");
    second.category = Some("c".into());
    second.country = Some("d:".into());
    harness.origin.respond_json(
        first.origin_url(support::API_BASE),
        v1_listing_body(vec![listing_item("x1", "chi-co-a", "")]),
    );
    harness.origin.respond_json(
        second.origin_url(support::API_BASE),
        v1_listing_body(vec![listing_item("y1", "chi-co-b", "")]),
    );

    harness.resolver.resolve(&first).await.unwrap();
    let resolution = harness.resolver.resolve(&second).await.unwrap();

    assert_eq!(resolution.origin, ResolutionOrigin::Api);
    assert_eq!(
        resolution.envelope.data.unwrap()["items"][0]["slug"],
        "chi-co-b"
    );
    assert_eq!(harness.origin.total_calls(), 2);
}

#[tokio::test]
async fn cancelled_first_caller_does_not_fail_joined_callers() {
    let harness = Harness::new();
    let request = list("phim-le");
    harness.origin.respond_json(
        request.origin_url(support::API_BASE),
        v1_listing_body(vec![listing_item("l1", "le-1", "")]),
    );
    harness.origin.set_delay(Duration::from_millis(150));

    let first = {
        let resolver = harness.resolver.clone();
        let request = request.clone();
        tokio::spawn(async move { resolver.resolve(&request).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let joined = {
        let resolver = harness.resolver.clone();
        let request = request.clone();
        tokio::spawn(async move { resolver.resolve(&request).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    first.abort();

    let resolution = joined.await.unwrap().unwrap();
    assert!(resolution.is_success());
    assert_eq!(harness.origin.total_calls(), 1);

    let cached = harness.resolver.resolve(&request).await.unwrap();
    assert!(cached.from_cache);
}

#[tokio::test]
async fn tag_names_cannot_be_requested_as_details() {
    let harness = Harness::new();

    let reserved = harness.resolver.resolve_detail("cached_keys").await;

    assert!(matches!(reserved, Err(PipelineError::NotFound { .. })));
    assert_eq!(harness.origin.total_calls(), 0);
    assert!(harness.cache.is_empty());
}
