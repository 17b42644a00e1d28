//! Walks one URL through the cache lifecycle:
//! miss and store, fresh hit, then a conditional revalidation once the entry
//! goes stale.
//!
//! Run with `cargo run --example revalidation`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http_revalidate::prelude::*;

const ETAG: &str = "\"v1\"";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    #[cfg(feature = "tracing")]
    {
        tracing_subscriber::fmt()
            .with_env_filter("tower_http_revalidate=debug")
            .init();
    }

    let clock = FixedClock::new(SystemTime::now());
    let origin_calls = Arc::new(AtomicUsize::new(0));

    let layer = CacheLayer::builder(InMemoryBackend::new(1_000))
        .clock(clock.clone())
        .event_log(EventLogConfig::new().with_enabled(true))
        .build();

    let origin = tower::service_fn({
        let clock = clock.clone();
        let calls = origin_calls.clone();
        move |req: Request<()>| {
            let now = clock.now();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let unchanged = req
                    .headers()
                    .get("if-none-match")
                    .is_some_and(|tag| tag == ETAG);
                let (status, body) = if unchanged {
                    (StatusCode::NOT_MODIFIED, Bytes::new())
                } else {
                    (StatusCode::OK, Bytes::from_static(b"{\"items\":[1,2,3]}"))
                };
                let response = Response::builder()
                    .status(status)
                    .header("cache-control", "max-age=5")
                    .header("date", httpdate::fmt_http_date(now))
                    .header("etag", ETAG)
                    .body(Full::new(body))?;
                Ok::<_, http::Error>(response)
            }
        }
    });

    let mut service = ServiceBuilder::new().layer(layer).service(origin);

    for (step, wait) in [("first", 0), ("second", 1), ("after expiry", 10)] {
        clock.advance(Duration::from_secs(wait));
        let response = service
            .ready()
            .await?
            .call(Request::get("http://api.example.com/items").body(())?)
            .await?;
        let marker = response
            .headers()
            .get("x-cache")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("MISS");
        println!(
            "{step:>12}: status={} x-cache={marker} origin_calls={}",
            response.status(),
            origin_calls.load(Ordering::SeqCst)
        );
    }

    Ok(())
}
