//! Response body plumbing shared by all pipeline stages.
//!
//! Every stage that rewrites a response (coalescing replays, compression,
//! rejection responses) produces [`BoxBody`], so the whole stack agrees on a
//! single concrete response type regardless of the handler's own body.

use crate::error::BoxError;
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full};

/// Type-erased response body used across the pipeline.
pub type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxes any body whose data is [`Bytes`].
pub fn boxed<B>(body: B) -> BoxBody
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body holding exactly `bytes`.
pub fn full(bytes: impl Into<Bytes>) -> BoxBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body with no data.
pub fn empty() -> BoxBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Builds a JSON response with the given status.
pub fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<BoxBody> {
    let payload = serde_json::to_vec(value).unwrap_or_default();
    let mut response = Response::new(full(payload));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
