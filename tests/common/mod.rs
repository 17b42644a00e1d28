#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Version};
use http_body_util::{BodyExt, Full};
use tower::Service;
use tower_http_revalidate::prelude::*;

pub const URL: &str = "http://example.com/resource";

pub fn start() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn clock() -> FixedClock {
    FixedClock::new(start())
}

pub fn http_date(at: SystemTime) -> String {
    httpdate::fmt_http_date(at)
}

pub fn request() -> Request<()> {
    Request::builder()
        .method(Method::GET)
        .uri(URL)
        .body(())
        .expect("valid request")
}

pub fn key() -> String {
    KeyBuilder::default()
        .build(&Method::GET, &URL.parse().expect("valid uri"), &HeaderMap::new())
        .expect("GET requests are keyed")
}

fn header_map(headers: &[(&str, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    map
}

pub fn entry(headers: &[(&str, String)], body: &'static str) -> CacheEntry {
    CacheEntry::new(
        StatusCode::OK,
        Version::HTTP_11,
        header_map(headers),
        Bytes::from_static(body.as_bytes()),
    )
}

pub fn response(status: StatusCode, headers: &[(&str, String)], body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body.to_owned()));
    *response.status_mut() = status;
    *response.headers_mut() = header_map(headers);
    response
}

pub async fn body_string(response: Response<Full<Bytes>>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collected")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

type Responder =
    dyn Fn(usize, &HeaderMap) -> Result<Response<Full<Bytes>>, io::Error> + Send + Sync;

/// Scripted origin recording every request it receives.
#[derive(Clone)]
pub struct Origin {
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<HeaderMap>>>,
    respond: Arc<Responder>,
}

impl Origin {
    /// `respond` receives the 1-based call number.
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(usize) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        Self::fallible(move |call| Ok(respond(call)))
    }

    /// Like [`Origin::new`], with access to the request headers.
    pub fn inspecting<F>(respond: F) -> Self
    where
        F: Fn(usize, &HeaderMap) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        Self::with_responder(move |call, headers| Ok(respond(call, headers)))
    }

    pub fn fallible<F>(respond: F) -> Self
    where
        F: Fn(usize) -> Result<Response<Full<Bytes>>, io::Error> + Send + Sync + 'static,
    {
        Self::with_responder(move |call, _headers| respond(call))
    }

    fn with_responder<F>(respond: F) -> Self
    where
        F: Fn(usize, &HeaderMap) -> Result<Response<Full<Bytes>>, io::Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            respond: Arc::new(respond),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> HeaderMap {
        self.requests
            .lock()
            .expect("requests lock")
            .last()
            .cloned()
            .expect("origin was called")
    }
}

impl Service<Request<()>> for Origin {
    type Response = Response<Full<Bytes>>;
    type Error = io::Error;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<()>) -> Self::Future {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .expect("requests lock")
            .push(req.headers().clone());
        std::future::ready((self.respond)(call, req.headers()))
    }
}
