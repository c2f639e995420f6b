//! Coalescing keys for HTTP requests.

use edge_resilience_core::accepts_gzip;
use http::{HeaderMap, Method, Uri};

/// Identity of a request for duplicate suppression.
///
/// Two requests share a signature when they use the same method, path and
/// query string and agree on whether they accept a gzip-encoded response.
/// Only `GET` and `HEAD` requests have a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    method: Method,
    path: String,
    query: Option<String>,
    accepts_gzip: bool,
}

impl RequestSignature {
    /// Computes the signature, or `None` for methods that must always run.
    ///
    /// ```
    /// use edge_resilience_coalesce::RequestSignature;
    /// use http::{HeaderMap, Method, Uri};
    ///
    /// let uri: Uri = "/reports/daily?region=eu".parse().unwrap();
    /// let sig = RequestSignature::of(&Method::GET, &uri, &HeaderMap::new()).unwrap();
    /// assert_eq!(sig.path(), "/reports/daily");
    /// assert_eq!(sig.query(), Some("region=eu"));
    ///
    /// assert!(RequestSignature::of(&Method::POST, &uri, &HeaderMap::new()).is_none());
    /// ```
    pub fn of(method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<Self> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }
        Some(Self {
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            accepts_gzip: accepts_gzip(headers),
        })
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Whether the caller negotiated gzip.
    pub fn accepts_gzip(&self) -> bool {
        self.accepts_gzip
    }
}
