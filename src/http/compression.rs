//! Response compression.
//!
//! # Responsibilities
//! - Decide per request whether the response is gzipped
//! - Wrap the response writer in a streaming gzip encoder
//!
//! # Design Decisions
//! - Gzip only, and only when the client lists it in `Accept-Encoding`
//! - Image and installer-package formats are passed through untouched
//! - The encoder compresses into memory and drains to the inner writer
//!   before accepting more input, so at most one chunk is held at a time
//! - A compressed response never carries the backend's `Content-Length`

use std::fmt;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::AsyncWrite;

use crate::http::resource::is_compressible;
use crate::http::sink::{OutboundSink, RelaySink, ResponseControl, ResponseWriter, SinkError};

/// Content coding token emitted in `Content-Encoding`.
pub const GZIP: &str = "gzip";

/// Per-request compression policy.
#[derive(Debug, Clone, Copy)]
pub struct CompressionGate {
    enabled: bool,
}

impl CompressionGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a response to a request for `path` carrying `accept_encoding`
    /// should be gzipped.
    pub fn should_compress(&self, accept_encoding: Option<&str>, path: &str) -> bool {
        self.enabled && accept_encoding.map(accepts_gzip).unwrap_or(false) && is_compressible(path)
    }

    pub fn applies_to<B>(&self, request: &Request<B>) -> bool {
        let accept_encoding = request
            .headers()
            .get(ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok());
        self.should_compress(accept_encoding, request.uri().path())
    }

    /// Pick the sink for `request`: the writer itself, or the writer behind
    /// a gzip encoder with `Content-Encoding: gzip` already set.
    pub fn wrap<B>(&self, request: &Request<B>, mut writer: ResponseWriter) -> OutboundSink {
        if !self.applies_to(request) {
            return OutboundSink::Plain(writer);
        }
        writer
            .headers_mut()
            .append(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
        OutboundSink::Gzip(GzipSink::new(writer))
    }
}

/// Whether an `Accept-Encoding` value admits gzip.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.to_ascii_lowercase().contains(GZIP)
}

/// Streaming gzip encoder in front of an async writer.
///
/// Must be shut down to emit the gzip trailer. If nothing was ever written,
/// shutdown emits nothing at all.
pub struct GzipSink<W> {
    inner: W,
    encoder: GzEncoder<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
    started: bool,
    finished: bool,
}

impl<W> GzipSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, Compression::default())
    }

    pub fn with_level(inner: W, level: Compression) -> Self {
        Self {
            inner,
            encoder: GzEncoder::new(Vec::new(), level),
            pending: Vec::new(),
            offset: 0,
            started: false,
            finished: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Move whatever the encoder produced into the pending buffer.
    /// Only called once the pending buffer has been drained.
    fn take_output(&mut self) {
        std::mem::swap(&mut self.pending, self.encoder.get_mut());
        self.offset = 0;
    }
}

impl<W: AsyncWrite + Unpin> GzipSink<W> {
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.offset < self.pending.len() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.offset..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.offset += n;
        }
        self.pending.clear();
        self.offset = 0;
        Poll::Ready(Ok(()))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for GzipSink<W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                "write after gzip stream finished",
            )));
        }
        ready!(this.poll_drain(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        this.encoder.write_all(buf)?;
        this.started = true;
        this.take_output();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        if this.started && !this.finished {
            this.encoder.flush()?;
            this.take_output();
            ready!(this.poll_drain(cx))?;
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        if this.started && !this.finished {
            this.encoder.try_finish()?;
            this.take_output();
        }
        this.finished = true;
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

impl<W: ResponseControl> ResponseControl for GzipSink<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if !self.inner.is_committed() {
            let headers = self.inner.headers_mut();
            headers.remove(CONTENT_LENGTH);
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
        }
        self.inner.write_status(status)
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }
}

impl<W> RelaySink for GzipSink<W>
where
    W: ResponseControl + AsyncWrite + Unpin + Send,
{
    fn response_control(&mut self) -> Option<&mut dyn ResponseControl> {
        Some(self)
    }
}

impl<W: fmt::Debug> fmt::Debug for GzipSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipSink")
            .field("inner", &self.inner)
            .field("pending", &(self.pending.len() - self.offset))
            .field("started", &self.started)
            .field("finished", &self.finished)
            .finish()
    }
}
