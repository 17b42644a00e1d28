//! Cache key derivation.

use std::fmt;
use std::sync::Arc;

use http::header::HOST;
use http::uri::Authority;
use http::{HeaderMap, Method, Uri};

/// Type alias for the key builder function
type KeyBuilderFn = Arc<dyn Fn(&Method, &Uri, &HeaderMap) -> Option<String> + Send + Sync>;

/// Strategy used to turn requests into cache keys.
///
/// The default, [`KeyBuilder::url`], keys on the method and the absolute URL.
/// Keys never vary on other request headers.
#[derive(Clone)]
pub struct KeyBuilder {
    inner: KeyBuilderFn,
}

impl KeyBuilder {
    /// `"{METHOD} {scheme}://{authority}{path}[?{query}]"`.
    ///
    /// Scheme and host are lower-cased and userinfo is dropped. Origin-form
    /// URIs take the host from the `Host` header and default to `http`.
    pub fn url() -> Self {
        Self {
            inner: Arc::new(|method: &Method, uri: &Uri, headers: &HeaderMap| {
                Some(url_key(method, uri, headers))
            }),
        }
    }

    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&Method, &Uri, &HeaderMap) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(func),
        }
    }

    /// Builds the key for a request.
    ///
    /// Returns `None` when the request should not touch the cache.
    pub fn build(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<String> {
        (self.inner)(method, uri, headers)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::url()
    }
}

impl fmt::Debug for KeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBuilder").finish_non_exhaustive()
    }
}

fn url_key(method: &Method, uri: &Uri, headers: &HeaderMap) -> String {
    let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
    let authority = uri
        .authority()
        .cloned()
        .or_else(|| headers.get(HOST)?.to_str().ok()?.parse::<Authority>().ok())
        .map(|authority| host_and_port(&authority))
        .unwrap_or_default();
    let path = match uri.path() {
        "" => "/",
        path => path,
    };

    let mut key = String::with_capacity(
        method.as_str().len() + scheme.len() + authority.len() + path.len() + 8,
    );
    key.push_str(method.as_str());
    key.push(' ');
    key.push_str(&scheme);
    key.push_str("://");
    key.push_str(&authority);
    key.push_str(path);
    if let Some(query) = uri.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

fn host_and_port(authority: &Authority) -> String {
    let host = authority.host().to_ascii_lowercase();
    match authority.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}
