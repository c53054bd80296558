//! Request forwarding to the selected backend.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the backend base URL
//! - Drop hop-by-hop headers, set `Host`, append `X-Forwarded-For`
//! - Keep the dispatch slot held until the response body is fully sent

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, BodyDataStream, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, header};
use futures_util::Stream;
use hyper::body::Incoming;
use url::Url;

use crate::load_balancer::DispatchGuard;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// `host[:port]` of a backend base URL.
fn authority(base: &Url) -> String {
    let host = base.host_str().unwrap_or_default();
    match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Map an inbound URI onto the backend: base path joined with the request
/// path, queries merged.
pub fn upstream_uri(base: &Url, original: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
    let base_path = base.path().trim_end_matches('/');
    let mut target = format!("{}://{}{}{}", base.scheme(), authority(base), base_path, original.path());

    match (base.query(), original.query()) {
        (Some(b), Some(o)) => target.push_str(&format!("?{}&{}", b, o)),
        (Some(q), None) | (None, Some(q)) => target.push_str(&format!("?{}", q)),
        (None, None) => {}
    }

    target.parse()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are hop-by-hop too.
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Build the request sent to the backend.
pub fn upstream_request(
    request: Request<Body>,
    base: &Url,
    peer: Option<SocketAddr>,
) -> Result<Request<Body>, axum::http::Error> {
    let (mut parts, body) = request.into_parts();

    parts.uri = upstream_uri(base, &parts.uri)?;
    strip_hop_by_hop(&mut parts.headers);

    if let Ok(host) = HeaderValue::from_str(&authority(base)) {
        parts.headers.insert(header::HOST, host);
    }

    if let Some(peer) = peer {
        let client_ip = peer.ip().to_string();
        let forwarded = match parts.headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{}, {}", prior, client_ip),
            None => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }
    }

    // Backends are reached over HTTP/1.1 whatever the client negotiated.
    parts.version = axum::http::Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}

/// Response body stream that owns the dispatch guard.
struct GuardedStream {
    inner: BodyDataStream,
    _guard: DispatchGuard,
}

impl Stream for GuardedStream {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Turn a backend response into a client response.
///
/// The guard lives inside the body, so the slot is released once the body has
/// been streamed or the client goes away.
pub fn into_client_response(response: Response<Incoming>, guard: DispatchGuard) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    let stream = GuardedStream {
        inner: Body::new(body).into_data_stream(),
        _guard: guard,
    };
    Response::from_parts(parts, Body::from_stream(stream))
}
