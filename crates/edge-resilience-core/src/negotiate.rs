//! Content-coding negotiation.
//!
//! Both the compressor and the coalescing signature need to know whether a
//! caller accepts gzip, and they must agree on the answer.

use http::header::ACCEPT_ENCODING;
use http::HeaderMap;

/// Returns true when `Accept-Encoding` allows a gzip response.
///
/// An explicit `gzip` (or `x-gzip`) entry wins over `*`. A quality of zero,
/// or one that does not parse, disables the coding.
///
/// ```
/// use edge_resilience_core::accepts_gzip;
/// use http::{header::ACCEPT_ENCODING, HeaderMap, HeaderValue};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("br, gzip;q=0.8"));
/// assert!(accepts_gzip(&headers));
///
/// headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip;q=0, *"));
/// assert!(!accepts_gzip(&headers));
/// ```
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip = None;
    let mut wildcard = None;

    for value in headers.get_all(ACCEPT_ENCODING) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for item in value.split(',') {
            let mut params = item.split(';');
            let coding = params.next().unwrap_or_default().trim();
            let quality = params
                .map(str::trim)
                .find_map(|p| p.strip_prefix("q=").or_else(|| p.strip_prefix("Q=")))
                .map_or(1.0, |q| q.trim().parse::<f32>().unwrap_or(0.0));

            if coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip") {
                gzip = Some(quality);
            } else if coding == "*" {
                wildcard = Some(quality);
            }
        }
    }

    gzip.or(wildcard).is_some_and(|q| q > 0.0)
}
