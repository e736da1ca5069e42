//! Client address resolution behind proxies.
//!
//! Order: first `X-Forwarded-For` entry, then `X-Real-IP`, then the transport
//! peer address. Whatever the source, a trailing port and IPv6 brackets are
//! removed so the result is a bare address string.

use axum::{extract::ConnectInfo, http::HeaderMap, http::request::Parts};
use std::net::{IpAddr, SocketAddr};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(normalize)
        .filter(|ip| !ip.is_empty());
    if forwarded.is_some() {
        return forwarded;
    }

    let real_ip = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(normalize)
        .filter(|ip| !ip.is_empty());
    if real_ip.is_some() {
        return real_ip;
    }

    peer.map(|addr| normalize(&addr.to_string()))
}

/// Parsed client address. Header values that are not IP addresses are
/// skipped, so the result is either a real address or the peer's.
pub fn client_ip_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let header_ip = |name: &str, first_only: bool| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| if first_only { v.split(',').next().unwrap_or(v) } else { v })
            .and_then(|v| normalize(v).parse::<IpAddr>().ok())
    };

    header_ip(X_FORWARDED_FOR, true)
        .or_else(|| header_ip(X_REAL_IP, false))
        .or_else(|| peer.map(|addr| addr.ip()))
}

/// Same as [`client_ip`], reading the peer from `ConnectInfo` when the server
/// was started with `into_make_service_with_connect_info`.
pub fn client_ip_from_parts(parts: &Parts) -> Option<String> {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(&parts.headers, peer)
}

/// `[::1]:443` -> `::1`, `10.0.0.1:80` -> `10.0.0.1`, `::1` stays as is.
fn normalize(raw: &str) -> String {
    let raw = raw.trim();

    if let Some(rest) = raw.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => rest[..end].to_string(),
            None => rest.to_string(),
        };
    }

    // A single colon means ipv4:port; more than one is a bare IPv6 address.
    match raw.rfind(':') {
        Some(idx) if raw.matches(':').count() == 1 => raw[..idx].to_string(),
        _ => raw.to_string(),
    }
}
