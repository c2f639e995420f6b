//! Response bodies produced by the compressor.
//!
//! The compressor reads the start of a body before deciding what to do with
//! it, so both bodies here replay that buffered prefix before continuing with
//! whatever remains of the original stream.

use crate::pool::PooledEncoder;
use crate::stats::CompressionStats;
use bytes::Bytes;
use edge_resilience_core::BoxError;
use flate2::{Compress, CompressError, Crc, FlushCompress, Status};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use thiserror::Error;

/// Fixed member header: magic, deflate, no flags, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

const CHUNK: usize = 8 * 1024;

/// Errors raised while producing gzip output.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The deflate encoder reported an error.
    #[error("deflate failed: {0}")]
    Deflate(#[from] CompressError),
    /// The encoder made no progress despite having room for output.
    #[error("deflate stalled")]
    Stalled,
}

fn reserve(out: &mut Vec<u8>) {
    if out.capacity() - out.len() < CHUNK / 4 {
        out.reserve(CHUNK);
    }
}

fn deflate(compress: &mut Compress, mut input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
    while !input.is_empty() {
        reserve(out);
        let consumed_before = compress.total_in();
        let written_before = out.len();
        compress.compress_vec(input, out, FlushCompress::None)?;
        let consumed = (compress.total_in() - consumed_before) as usize;
        if consumed == 0 && out.len() == written_before {
            return Err(CompressionError::Stalled);
        }
        input = &input[consumed..];
    }
    Ok(())
}

fn finish(compress: &mut Compress, out: &mut Vec<u8>) -> Result<(), CompressionError> {
    loop {
        reserve(out);
        let written_before = out.len();
        match compress.compress_vec(&[], out, FlushCompress::Finish)? {
            Status::StreamEnd => return Ok(()),
            _ if out.len() == written_before => return Err(CompressionError::Stalled),
            _ => {}
        }
    }
}

/// One gzip member being written with a pooled encoder.
struct GzipStream {
    encoder: PooledEncoder,
    crc: Crc,
    bytes_in: u64,
}

impl GzipStream {
    fn write(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        self.crc.update(data);
        self.bytes_in += data.len() as u64;
        match self.encoder.compress() {
            Some(compress) => deflate(compress, data, out),
            None => Err(CompressionError::Stalled),
        }
    }

    /// Flushes the encoder and appends the trailer; returns the number of
    /// uncompressed bytes written.
    fn finish(mut self, out: &mut Vec<u8>) -> Result<u64, CompressionError> {
        match self.encoder.compress() {
            Some(compress) => finish(compress, out)?,
            None => return Err(CompressionError::Stalled),
        }
        out.extend_from_slice(&self.crc.sum().to_le_bytes());
        out.extend_from_slice(&self.crc.amount().to_le_bytes());
        self.encoder.mark_finished();
        Ok(self.bytes_in)
    }
}

pin_project! {
    /// Gzip-encodes a buffered prefix followed by the rest of the original body.
    ///
    /// Output is a single gzip member (RFC 1952). Trailers from the original
    /// body are forwarded after the final data frame. If the encoder fails
    /// mid-stream the body ends with an error rather than truncated gzip.
    pub struct GzipBody<B> {
        #[pin]
        inner: Option<B>,
        stream: Option<GzipStream>,
        pending: Option<Bytes>,
        trailers: Option<HeaderMap>,
        stats: Arc<CompressionStats>,
        bytes_out: u64,
    }
}

/// Gzip header plus the compressed prefix, ready to become a [`GzipBody`].
///
/// Compressing the prefix happens before response headers are committed, so
/// a failure there still allows falling back to the uncompressed bytes.
pub(crate) struct GzipPrelude {
    stream: GzipStream,
    out: Vec<u8>,
}

impl GzipPrelude {
    pub(crate) fn begin(encoder: PooledEncoder, prefix: &[u8]) -> Result<Self, CompressionError> {
        let mut stream = GzipStream {
            encoder,
            crc: Crc::new(),
            bytes_in: 0,
        };
        let mut out = GZIP_HEADER.to_vec();
        stream.write(prefix, &mut out)?;
        Ok(Self { stream, out })
    }

    /// Continues the stream with `inner`, the unread remainder of the
    /// original body, or `None` if it already ended.
    pub(crate) fn into_body<B>(
        self,
        inner: Option<B>,
        trailers: Option<HeaderMap>,
        stats: Arc<CompressionStats>,
    ) -> GzipBody<B> {
        GzipBody {
            inner,
            stream: Some(self.stream),
            pending: Some(Bytes::from(self.out)),
            trailers,
            stats,
            bytes_out: 0,
        }
    }
}

impl<B> Body for GzipBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        loop {
            if let Some(chunk) = this.pending.take() {
                *this.bytes_out += chunk.len() as u64;
                return Poll::Ready(Some(Ok(Frame::data(chunk))));
            }

            let Some(stream) = this.stream.as_mut() else {
                return Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))));
            };

            let frame = match this.inner.as_mut().as_pin_mut() {
                Some(inner) => ready!(inner.poll_frame(cx)),
                None => None,
            };

            match frame {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        let mut out = Vec::new();
                        if let Err(err) = stream.write(&data, &mut out) {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(error = %err, "gzip encoding failed mid-stream");

                            *this.stream = None;
                            this.inner.set(None);
                            return Poll::Ready(Some(Err(err.into())));
                        }
                        if !out.is_empty() {
                            *this.pending = Some(Bytes::from(out));
                        }
                    }
                    Err(frame) => {
                        if let Ok(trailers) = frame.into_trailers() {
                            *this.trailers = Some(trailers);
                        }
                        this.inner.set(None);
                    }
                },
                Some(Err(err)) => {
                    *this.stream = None;
                    this.inner.set(None);
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    this.inner.set(None);
                    let Some(stream) = this.stream.take() else {
                        continue;
                    };
                    let mut out = Vec::new();
                    match stream.finish(&mut out) {
                        Ok(bytes_in) => {
                            this.stats
                                .record(bytes_in, *this.bytes_out + out.len() as u64);
                            *this.pending = Some(Bytes::from(out));
                        }
                        Err(err) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(error = %err, "gzip encoding failed at end of stream");

                            return Poll::Ready(Some(Err(err.into())));
                        }
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_none() && self.stream.is_none() && self.trailers.is_none()
    }
}

pin_project! {
    /// Replays a buffered prefix, then the rest of the original body unchanged.
    pub struct PrefixedBody<B> {
        prefix: Option<Bytes>,
        #[pin]
        rest: Option<B>,
        trailers: Option<HeaderMap>,
    }
}

impl<B> PrefixedBody<B> {
    pub(crate) fn new(prefix: Bytes, rest: Option<B>, trailers: Option<HeaderMap>) -> Self {
        Self {
            prefix: (!prefix.is_empty()).then_some(prefix),
            rest,
            trailers,
        }
    }
}

impl<B> Body for PrefixedBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        if let Some(prefix) = this.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }

        if let Some(rest) = this.rest.as_mut().as_pin_mut() {
            match ready!(rest.poll_frame(cx)) {
                Some(result) => return Poll::Ready(Some(result.map_err(Into::into))),
                None => this.rest.set(None),
            }
        }

        Poll::Ready(this.trailers.take().map(|t| Ok(Frame::trailers(t))))
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none()
            && self.trailers.is_none()
            && self.rest.as_ref().map_or(true, Body::is_end_stream)
    }

    fn size_hint(&self) -> SizeHint {
        let prefix = self.prefix.as_ref().map_or(0, |p| p.len() as u64);
        match &self.rest {
            Some(rest) => {
                let rest = rest.size_hint();
                let mut hint = SizeHint::new();
                hint.set_lower(rest.lower() + prefix);
                if let Some(upper) = rest.upper() {
                    hint.set_upper(upper + prefix);
                }
                hint
            }
            None => SizeHint::with_exact(prefix),
        }
    }
}
