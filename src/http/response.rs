//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers on both legs of a proxied exchange
//! - Produce the proxy's own error responses
//!
//! # Design Decisions
//! - Upstream bodies are streamed through, never buffered
//! - Error bodies are short `text/plain` messages

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// Headers that describe a single connection and must not be forwarded.
pub const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn plain_text(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        Body::from(message),
    )
        .into_response()
}

/// No route for the request's host and path.
pub fn not_found() -> Response {
    plain_text(StatusCode::NOT_FOUND, "upstream server not found")
}

/// The upstream could not be reached or failed mid-request.
pub fn bad_gateway() -> Response {
    plain_text(StatusCode::BAD_GATEWAY, "upstream request failed")
}
