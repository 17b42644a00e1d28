mod common;

use std::io;
use std::time::Duration;

use http::header::{CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, PRAGMA};
use http::{Request, StatusCode};
use tower::{Layer, ServiceExt};
use tower_http_revalidate::prelude::*;

use common::{body_string, clock, entry, http_date, key, request, response, start, Origin, URL};

const LAST_MODIFIED: &str = "Sun, 06 Nov 1994 08:49:37 GMT";

fn stale_headers(validator: (&'static str, &str)) -> Vec<(&'static str, String)> {
    vec![
        ("cache-control", "max-age=60".to_owned()),
        ("date", http_date(start() - Duration::from_secs(120))),
        (validator.0, validator.1.to_owned()),
    ]
}

fn not_modified(_call: usize) -> http::Response<http_body_util::Full<bytes::Bytes>> {
    response(
        StatusCode::NOT_MODIFIED,
        &[("date", http_date(start()))],
        "",
    )
}

async fn layer_with(stored: CacheEntry) -> CacheLayer<InMemoryBackend> {
    let layer = CacheLayer::builder(InMemoryBackend::new(16))
        .clock(clock())
        .build();
    layer
        .backend()
        .set(key(), stored)
        .await
        .expect("seed entry");
    layer
}

#[tokio::test]
async fn stale_last_modified_is_revalidated() {
    let layer = layer_with(entry(&stale_headers(("last-modified", LAST_MODIFIED)), "cached")).await;
    let origin = Origin::new(not_modified);

    let response = layer
        .layer(origin.clone())
        .oneshot(request())
        .await
        .expect("call succeeds");

    assert!(is_cache_hit(&response));
    assert_eq!(body_string(response).await, "cached");
    assert_eq!(origin.calls(), 1);

    let sent = origin.last_request();
    assert_eq!(sent.get(IF_MODIFIED_SINCE).unwrap(), LAST_MODIFIED);
    assert!(sent.get(IF_NONE_MATCH).is_none());
}

#[tokio::test]
async fn stale_etag_is_revalidated() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(not_modified);

    let response = layer
        .layer(origin.clone())
        .oneshot(request())
        .await
        .expect("call succeeds");

    assert!(is_cache_hit(&response));
    assert_eq!(response.headers().get(ETAG).unwrap(), "\"123\"");
    assert_eq!(body_string(response).await, "cached");

    let sent = origin.last_request();
    assert_eq!(sent.get(IF_NONE_MATCH).unwrap(), "\"123\"");
    assert!(sent.get(IF_MODIFIED_SINCE).is_none());
}

#[tokio::test]
async fn validated_entry_keeps_stored_body_in_backend() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(not_modified);

    layer
        .layer(origin)
        .oneshot(request())
        .await
        .expect("call succeeds");

    let stored = layer.backend().get(&key()).await.unwrap().expect("kept");
    assert_eq!(stored.body, "cached");
    assert_eq!(stored.headers.get(ETAG).unwrap(), "\"123\"");
}

#[tokio::test]
async fn changed_etag_replaces_stored_entry() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(|_| {
        response(
            StatusCode::OK,
            &[
                ("cache-control", "max-age=60".to_owned()),
                ("date", http_date(start())),
                ("etag", "\"345\"".to_owned()),
            ],
            "updated",
        )
    });
    let service = layer.layer(origin.clone());

    let response = service.clone().oneshot(request()).await.expect("call succeeds");
    assert!(response.headers().get("x-cache").is_none());
    assert_eq!(response.headers().get(ETAG).unwrap(), "\"345\"");
    assert_eq!(body_string(response).await, "updated");
    assert_eq!(origin.last_request().get(IF_NONE_MATCH).unwrap(), "\"123\"");

    let stored = layer.backend().get(&key()).await.unwrap().expect("replaced");
    assert_eq!(stored.headers.get(ETAG).unwrap(), "\"345\"");
    assert_eq!(stored.body, "updated");

    let again = service.oneshot(request()).await.expect("call succeeds");
    assert!(is_cache_hit(&again));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn stored_no_store_entry_is_served_once_then_deleted() {
    let layer = layer_with(entry(
        &[
            ("cache-control", "max-age=0, no-store".to_owned()),
            ("date", http_date(start())),
            ("etag", "\"123\"".to_owned()),
        ],
        "cached",
    ))
    .await;
    let origin = Origin::new(|call| match call {
        1 => not_modified(call),
        _ => response(StatusCode::OK, &[], "fresh from origin"),
    });
    let service = layer.layer(origin.clone());

    let first = service.clone().oneshot(request()).await.expect("first call");
    assert!(is_cache_hit(&first));
    assert_eq!(body_string(first).await, "cached");
    assert!(layer.backend().get(&key()).await.unwrap().is_none());

    let second = service.oneshot(request()).await.expect("second call");
    assert!(!is_cache_hit(&second));
    assert_eq!(body_string(second).await, "fresh from origin");
    assert_eq!(origin.calls(), 2);
    assert!(origin.last_request().get(IF_NONE_MATCH).is_none());
}

#[tokio::test]
async fn replaced_response_with_no_store_removes_entry() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(|_| {
        response(
            StatusCode::OK,
            &[("cache-control", "no-store".to_owned())],
            "private now",
        )
    });

    let response = layer
        .layer(origin)
        .oneshot(request())
        .await
        .expect("call succeeds");
    assert_eq!(body_string(response).await, "private now");
    assert!(layer.backend().get(&key()).await.unwrap().is_none());
}

#[tokio::test]
async fn no_cache_entry_is_always_revalidated() {
    let layer = layer_with(entry(
        &[
            ("cache-control", "no-cache, max-age=3600".to_owned()),
            ("date", http_date(start())),
            ("etag", "\"abc\"".to_owned()),
        ],
        "cached",
    ))
    .await;
    let origin = Origin::new(not_modified);

    let response = layer
        .layer(origin.clone())
        .oneshot(request())
        .await
        .expect("call succeeds");
    assert!(is_cache_hit(&response));
    assert_eq!(origin.calls(), 1);
    assert_eq!(origin.last_request().get(IF_NONE_MATCH).unwrap(), "\"abc\"");
}

#[tokio::test]
async fn entry_becomes_stale_as_clock_advances() {
    let fixed = clock();
    let layer = CacheLayer::builder(InMemoryBackend::new(16))
        .clock(fixed.clone())
        .build();
    layer
        .backend()
        .set(
            key(),
            entry(
                &[
                    ("cache-control", "max-age=60".to_owned()),
                    ("date", http_date(start())),
                    ("last-modified", LAST_MODIFIED.to_owned()),
                ],
                "cached",
            ),
        )
        .await
        .unwrap();
    let origin = Origin::new(not_modified);
    let service = layer.layer(origin.clone());

    fixed.advance(Duration::from_secs(59));
    service.clone().oneshot(request()).await.expect("fresh call");
    assert_eq!(origin.calls(), 0);

    fixed.advance(Duration::from_secs(1));
    let response = service.oneshot(request()).await.expect("stale call");
    assert!(is_cache_hit(&response));
    assert_eq!(origin.calls(), 1);
}

#[tokio::test]
async fn revalidation_error_propagates_and_keeps_entry() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::fallible(|_| Err(io::Error::other("connection reset")));

    let err = layer
        .layer(origin.clone())
        .oneshot(request())
        .await
        .expect_err("revalidation fails");
    assert_eq!(err.to_string(), "connection reset");
    assert_eq!(origin.calls(), 1);

    let stored = layer.backend().get(&key()).await.unwrap().expect("kept");
    assert_eq!(stored.body, "cached");
}

#[tokio::test]
async fn serve_stale_on_revalidation_error() {
    let layer = CacheLayer::builder(InMemoryBackend::new(16))
        .clock(clock())
        .revalidation_failure(RevalidationFailure::ServeStale)
        .build();
    layer
        .backend()
        .set(key(), entry(&stale_headers(("etag", "\"123\"")), "cached"))
        .await
        .unwrap();
    let origin = Origin::fallible(|_| Err(io::Error::other("connection reset")));

    let response = layer
        .layer(origin)
        .oneshot(request())
        .await
        .expect("stale entry served");
    assert_eq!(response.headers().get("x-cache").unwrap(), STALE);
    assert!(!is_cache_hit(&response));
    assert_eq!(body_string(response).await, "cached");
}

#[tokio::test]
async fn request_no_cache_forces_revalidation() {
    let fresh = vec![
        ("cache-control", "max-age=600".to_owned()),
        ("date", http_date(start())),
        ("etag", "\"123\"".to_owned()),
    ];

    for (name, value) in [(CACHE_CONTROL, "no-cache"), (PRAGMA, "no-cache")] {
        let layer = layer_with(entry(&fresh, "cached")).await;
        let origin = Origin::new(not_modified);

        let request = Request::get(URL).header(name.clone(), value).body(()).unwrap();
        let response = layer
            .layer(origin.clone())
            .oneshot(request)
            .await
            .expect("call succeeds");

        assert!(is_cache_hit(&response), "{name}");
        assert_eq!(origin.calls(), 1, "{name}");
        assert_eq!(origin.last_request().get(IF_NONE_MATCH).unwrap(), "\"123\"");
    }
}

#[tokio::test]
async fn caller_validators_never_reach_revalidation() {
    let layer = layer_with(entry(
        &[
            ("cache-control", "max-age=60".to_owned()),
            ("date", http_date(start() - Duration::from_secs(120))),
        ],
        "old body",
    ))
    .await;
    let origin = Origin::inspecting(|call, headers| {
        if headers.contains_key(IF_NONE_MATCH) {
            return not_modified(call);
        }
        response(
            StatusCode::OK,
            &[
                ("cache-control", "max-age=60".to_owned()),
                ("date", http_date(start())),
                ("etag", "\"v2\"".to_owned()),
            ],
            "new body",
        )
    });

    let request = Request::get(URL)
        .header(IF_NONE_MATCH, "\"v2\"")
        .header(IF_MODIFIED_SINCE, LAST_MODIFIED)
        .body(())
        .unwrap();
    let response = layer
        .layer(origin.clone())
        .oneshot(request)
        .await
        .expect("call succeeds");

    let sent = origin.last_request();
    assert!(sent.get(IF_NONE_MATCH).is_none());
    assert!(sent.get(IF_MODIFIED_SINCE).is_none());
    assert!(!is_cache_hit(&response));
    assert_eq!(body_string(response).await, "new body");
}

#[tokio::test]
async fn stored_etag_overrides_caller_etag() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(not_modified);

    let request = Request::get(URL)
        .header(IF_NONE_MATCH, "\"client\"")
        .body(())
        .unwrap();
    let response = layer
        .layer(origin.clone())
        .oneshot(request)
        .await
        .expect("call succeeds");

    assert_eq!(origin.last_request().get(IF_NONE_MATCH).unwrap(), "\"123\"");
    assert!(is_cache_hit(&response));
}

#[tokio::test]
async fn unstorable_replacement_removes_entry() {
    let layer = layer_with(entry(&stale_headers(("etag", "\"123\"")), "cached")).await;
    let origin = Origin::new(|call| {
        response(
            StatusCode::OK,
            &[("etag", "\"345\"".to_owned())],
            &format!("replacement {call}"),
        )
    });
    let service = layer.layer(origin.clone());

    let first = service.clone().oneshot(request()).await.expect("first call");
    assert_eq!(body_string(first).await, "replacement 1");
    assert!(layer.backend().get(&key()).await.unwrap().is_none());

    let second = service.oneshot(request()).await.expect("second call");
    assert_eq!(body_string(second).await, "replacement 2");
    assert!(origin.last_request().get(IF_NONE_MATCH).is_none());
}
