//! Header and cookie translation between the two legs of a relay.
//!
//! Multi-value headers keep their value order: the first value replaces
//! whatever the target holds for that name, the rest are appended.

use axum::http::header::{COOKIE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use cookie::Cookie;

/// Conditional-request headers. Without a cache in front of the backend a
/// `304 Not Modified` could not be turned back into a full response.
pub const CONDITIONAL_HEADERS: [HeaderName; 2] = [IF_MODIFIED_SINCE, IF_NONE_MATCH];

/// Copy every value of `name` from `src` into `dst`.
pub fn copy_values(src: &HeaderMap, dst: &mut HeaderMap, name: &HeaderName) {
    let mut values = src.get_all(name).iter();
    if let Some(first) = values.next() {
        dst.insert(name.clone(), first.clone());
        for value in values {
            dst.append(name.clone(), value.clone());
        }
    }
}

/// Copy every header of `src` into `dst`.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for name in src.keys() {
        copy_values(src, dst, name);
    }
}

/// Build the outbound header map for a request.
///
/// `Cookie` is left out here and rebuilt by [`translate_cookies`]. The
/// conditional headers are dropped unless `local_caching` is on.
pub fn translate_request_headers(inbound: &HeaderMap, local_caching: bool) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.keys_len());
    for name in inbound.keys() {
        if name == COOKIE {
            continue;
        }
        if !local_caching && CONDITIONAL_HEADERS.contains(name) {
            continue;
        }
        copy_values(inbound, &mut outbound, name);
    }
    outbound
}

/// Re-attach inbound cookies as one normalized `Cookie` header.
///
/// Every `Cookie` header is parsed; pairs that do not parse are dropped and
/// the rest are written back in order as `name=value; name=value`.
/// Returns the number of cookies forwarded.
pub fn translate_cookies(inbound: &HeaderMap, outbound: &mut HeaderMap) -> usize {
    let mut pairs = Vec::new();
    for value in inbound.get_all(COOKIE) {
        let Ok(raw) = value.to_str() else {
            tracing::debug!("Skipping non-UTF-8 Cookie header");
            continue;
        };
        for parsed in Cookie::split_parse(raw) {
            match parsed {
                Ok(cookie) => pairs.push(format!("{}={}", cookie.name(), cookie.value())),
                Err(e) => tracing::debug!(error = %e, "Dropping unparsable cookie"),
            }
        }
    }

    if pairs.is_empty() {
        return 0;
    }

    match HeaderValue::from_str(&pairs.join("; ")) {
        Ok(value) => {
            outbound.insert(COOKIE, value);
            pairs.len()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Normalized Cookie header is not a valid header value");
            0
        }
    }
}
