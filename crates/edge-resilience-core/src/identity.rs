//! Client identity for per-client admission control.
//!
//! Identity is taken, in priority order, from the first address in
//! `X-Forwarded-For`, then `X-Real-IP`, then the peer address the server
//! attached to the request as an extension.

use http::{Extensions, HeaderMap, Request};
use std::net::SocketAddr;

/// Header carrying the proxy chain, client first.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Header carrying the original client address set by a fronting proxy.
pub const REAL_IP: &str = "x-real-ip";

/// Identity used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Peer address of the connection, inserted into request extensions by the
/// server accepting the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Derives the rate-limiting identity of the caller.
pub fn client_identity<B>(request: &Request<B>) -> String {
    identity_from_parts(request.headers(), request.extensions())
}

/// Same as [`client_identity`], for callers holding the request's parts.
pub fn identity_from_parts(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get(REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    if let Some(PeerAddr(addr)) = extensions.get::<PeerAddr>() {
        return addr.ip().to_string();
    }
    if let Some(addr) = extensions.get::<SocketAddr>() {
        return addr.ip().to_string();
    }

    UNKNOWN_CLIENT.to_string()
}
