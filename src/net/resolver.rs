//! Backend address resolution.
//!
//! # Responsibilities
//! - Derive a `host:port` dial target from an inbound host value
//! - Default to port 80 when no numeric port is present
//!
//! # Design Decisions
//! - Pure string transform: no hostname validation, no DNS (the dialer resolves)
//! - A trailing `:<digits>` counts as a port; anything else gets `:80` appended
//! - No regex, matching is a single reverse scan

use axum::http::{header::HOST, request::Parts, Request};

/// Port used when the host carries none.
pub const DEFAULT_PORT: u16 = 80;

/// Resolve a host value into a dial target.
///
/// `"example.com"` becomes `"example.com:80"`, `"example.com:8443"` is
/// returned unchanged. Malformed input is passed through with the suffix.
pub fn resolve(host: &str) -> String {
    if has_port(host) {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_PORT)
    }
}

fn has_port(host: &str) -> bool {
    match host.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Host the client addressed: the URI authority for absolute-form targets,
/// otherwise the `Host` header. Empty when neither is present.
pub fn request_host<B>(request: &Request<B>) -> String {
    host_of(request.uri().authority().map(|a| a.as_str()), request.headers())
}

pub(crate) fn parts_host(parts: &Parts) -> String {
    host_of(parts.uri.authority().map(|a| a.as_str()), &parts.headers)
}

fn host_of(authority: Option<&str>, headers: &axum::http::HeaderMap) -> String {
    if let Some(authority) = authority {
        return authority.to_string();
    }
    headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_default_port() {
        assert_eq!(resolve("example.com"), "example.com:80");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(resolve("example.com:8443"), "example.com:8443");
        assert_eq!(resolve("127.0.0.1:3000"), "127.0.0.1:3000");
    }

    #[test]
    fn non_numeric_suffix_gets_default_port() {
        assert_eq!(resolve("example.com:"), "example.com::80");
        assert_eq!(resolve("example.com:http"), "example.com:http:80");
    }

    #[test]
    fn bracketed_ipv6() {
        assert_eq!(resolve("[::1]"), "[::1]:80");
        assert_eq!(resolve("[::1]:9000"), "[::1]:9000");
    }

    #[test]
    fn empty_host() {
        assert_eq!(resolve(""), ":80");
    }

    #[test]
    fn host_from_header() {
        let req = Request::builder()
            .uri("/index.html")
            .header(HOST, "backend.local:81")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), "backend.local:81");
    }

    #[test]
    fn host_from_absolute_target() {
        let req = Request::builder()
            .uri("http://origin.local/x?y=1")
            .header(HOST, "ignored.local")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), "origin.local");
    }

    #[test]
    fn missing_host_is_empty() {
        let req = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(request_host(&req), "");
    }
}
