//! Stream relay.
//!
//! `GET /proxy?url=<encoded origin>` opens one upstream connection and pipes
//! the body through verbatim.  Content type and the ICY headers are
//! forwarded so the element (and any metadata reader sharing the path) sees
//! the stream exactly as if it had connected directly; everything else about
//! the upstream response is dropped.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::GatewayState;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
}

/// Only plain web streams are relayed; anything else is a caller error.
fn acceptable_origin(raw: &str) -> bool {
    matches!(Url::parse(raw), Ok(u) if matches!(u.scheme(), "http" | "https"))
}

pub async fn relay_stream(
    State(state): State<GatewayState>,
    Query(query): Query<RelayQuery>,
) -> Response {
    let Some(url) = query.url else {
        return (StatusCode::BAD_REQUEST, "missing url").into_response();
    };
    if !acceptable_origin(&url) {
        warn!("relay: rejecting non-http origin {:?}", url);
        return (StatusCode::BAD_REQUEST, "unsupported url").into_response();
    }

    info!("relay: opening upstream {}", url);
    let upstream = match state.client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("relay: upstream connect failed for {}: {}", url, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let upstream_status = upstream.status();
    if !upstream_status.is_success() {
        warn!("relay: upstream returned {} for {}", upstream_status, url);
        return StatusCode::BAD_GATEWAY.into_response();
    }

    // Forward content-type, transfer-encoding and all ICY headers; skip the
    // rest (hop-by-hop and upstream-specific noise).
    let mut builder = Response::builder().status(200);
    let mut saw_content_type = false;
    for (name, value) in upstream.headers() {
        let name_str = name.as_str();
        if name_str.starts_with("icy-")
            || name_str == "content-type"
            || name_str == "transfer-encoding"
        {
            if let Ok(hv) = axum::http::HeaderValue::from_bytes(value.as_bytes()) {
                saw_content_type |= name_str == "content-type";
                builder = builder.header(name_str, hv);
            }
        }
    }
    if !saw_content_type {
        builder = builder.header("content-type", "audio/mpeg");
    }

    let byte_stream = upstream
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    builder.body(Body::from_stream(byte_stream)).unwrap()
}
