//! Per-request tracing span for `tower_http::trace::TraceLayer`.
//!
//! Everything logged while a request is being handled (including the
//! `AppError` responses) inherits these fields.

use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    http::header,
};
use std::net::SocketAddr;
use tracing::Span;

use crate::middleware::tracing::REQUEST_ID_HEADER;

pub fn make_request_span(req: &Request) -> Span {
    let header_str = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();

    tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        route = %route,
        remote_addr = %remote_addr,
        user_agent = %header_str(header::USER_AGENT),
        request_id = %header_str(header::HeaderName::from_static(REQUEST_ID_HEADER)),
    )
}
