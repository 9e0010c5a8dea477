//! Response sinks.
//!
//! # Responsibilities
//! - Model the two relay targets: a full response channel (status + headers +
//!   body) and a plain byte sink (body only)
//! - Turn handler writes into a streaming `Response` for the HTTP server
//! - Write plain-text error responses
//!
//! # Design Decisions
//! - Response control is a capability the sink opts into through
//!   `RelaySink::response_control`, so body-only targets skip header and
//!   status propagation without any runtime type inspection
//! - The response head is committed once: explicitly via `write_status`, or
//!   implicitly as `200 OK` on the first body write, shutdown or drop
//! - Body bytes cross to the server through a bounded in-memory pipe, so a
//!   slow client applies backpressure to the relay and a gone client turns
//!   into a `BrokenPipe` write error

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use bytes::BytesMut;
use futures_util::stream::{self, Stream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use crate::http::compression::GzipSink;

/// Bytes buffered between the writer and the server before writes block.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Largest chunk handed to the server per read.
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("response head already written with status {0}")]
    AlreadyCommitted(StatusCode),
}

/// Status and header control over the real outbound channel.
pub trait ResponseControl {
    /// Headers that will be sent with the response head. Changes made after
    /// the head is committed are not sent.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the response head with `status`.
    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError>;

    /// Whether the head has already been sent.
    fn is_committed(&self) -> bool;
}

/// Anything a relay can stream a response into.
pub trait RelaySink: AsyncWrite + Unpin + Send {
    /// `Some` when the sink can also carry status and headers.
    fn response_control(&mut self) -> Option<&mut dyn ResponseControl>;
}

/// A byte-only relay target: status and headers are dropped, the body is kept.
#[derive(Debug, Default)]
pub struct BodyOnly<W>(W);

impl<W> BodyOnly<W> {
    pub fn new(inner: W) -> Self {
        Self(inner)
    }

    pub fn get_ref(&self) -> &W {
        &self.0
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for BodyOnly<W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl<W: AsyncWrite + Unpin + Send> RelaySink for BodyOnly<W> {
    fn response_control(&mut self) -> Option<&mut dyn ResponseControl> {
        None
    }
}

/// Receives the committed response head (with its streaming body).
pub type ResponseHead = oneshot::Receiver<Response<Body>>;

/// Writer side of an inbound request's response.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response<Body>>>,
    body_reader: Option<DuplexStream>,
    body_writer: DuplexStream,
}

impl ResponseWriter {
    /// Create a writer and the receiver its response head is delivered to.
    pub fn channel() -> (Self, ResponseHead) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_writer, body_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let writer = Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_reader: Some(body_reader),
            body_writer,
        };
        (writer, head_rx)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn commit(&mut self) {
        let Some(head_tx) = self.head_tx.take() else {
            return;
        };

        let body = match self.body_reader.take() {
            Some(reader) => Body::from_stream(body_stream(reader)),
            None => Body::empty(),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        if head_tx.send(response).is_err() {
            tracing::debug!(status = %self.status, "Response head dropped, client is gone");
        }
    }
}

fn body_stream<R>(reader: R) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some((reader, BytesMut::new())), |state| async move {
        let (mut reader, mut buf) = state?;
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                let chunk = buf.split().freeze();
                Some((Ok(chunk), Some((reader, buf))))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

impl ResponseControl for ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if self.is_committed() {
            return Err(SinkError::AlreadyCommitted(self.status));
        }
        self.status = status;
        self.commit();
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.head_tx.is_none()
    }
}

impl AsyncWrite for ResponseWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.commit();
        Pin::new(&mut this.body_writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().body_writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.commit();
        Pin::new(&mut this.body_writer).poll_shutdown(cx)
    }
}

impl RelaySink for ResponseWriter {
    fn response_control(&mut self) -> Option<&mut dyn ResponseControl> {
        Some(self)
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        // A handler that panicked must not produce an implicit 200.
        if !std::thread::panicking() {
            self.commit();
        }
    }
}

/// The sink a handler writes its response into.
#[derive(Debug)]
pub enum OutboundSink {
    Plain(ResponseWriter),
    Gzip(GzipSink<ResponseWriter>),
}

impl OutboundSink {
    pub fn is_compressed(&self) -> bool {
        matches!(self, OutboundSink::Gzip(_))
    }
}

impl AsyncWrite for OutboundSink {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            OutboundSink::Plain(w) => Pin::new(w).poll_write(cx, buf),
            OutboundSink::Gzip(w) => Pin::new(w).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutboundSink::Plain(w) => Pin::new(w).poll_flush(cx),
            OutboundSink::Gzip(w) => Pin::new(w).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            OutboundSink::Plain(w) => Pin::new(w).poll_shutdown(cx),
            OutboundSink::Gzip(w) => Pin::new(w).poll_shutdown(cx),
        }
    }
}

impl ResponseControl for OutboundSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            OutboundSink::Plain(w) => w.headers_mut(),
            OutboundSink::Gzip(w) => w.headers_mut(),
        }
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        match self {
            OutboundSink::Plain(w) => w.write_status(status),
            OutboundSink::Gzip(w) => w.write_status(status),
        }
    }

    fn is_committed(&self) -> bool {
        match self {
            OutboundSink::Plain(w) => w.is_committed(),
            OutboundSink::Gzip(w) => w.is_committed(),
        }
    }
}

impl RelaySink for OutboundSink {
    fn response_control(&mut self) -> Option<&mut dyn ResponseControl> {
        Some(self)
    }
}

/// Write a plain-text error response.
///
/// When the head has already gone out the message is not written, since it
/// would be appended to a body the client is already reading.
pub async fn write_error<S: RelaySink>(sink: &mut S, status: StatusCode, message: &str) -> io::Result<()> {
    if let Some(control) = sink.response_control() {
        if control.is_committed() {
            tracing::warn!(status = %status, error = message, "Response already started, error not sent");
            return Ok(());
        }
        let headers = control.headers_mut();
        headers.remove(CONTENT_LENGTH);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        if let Err(e) = control.write_status(status) {
            tracing::warn!(error = %e, "Failed to write error status");
        }
    }

    sink.write_all(message.as_bytes()).await?;
    sink.write_all(b"\n").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn body_chunks_follow_writes() {
        use futures_util::StreamExt;

        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut chunks = Box::pin(body_stream(rx));

        tx.write_all(b"ab").await.unwrap();
        assert_eq!(&chunks.next().await.unwrap().unwrap()[..], b"ab");

        tx.write_all(b"cde").await.unwrap();
        drop(tx);
        assert_eq!(&chunks.next().await.unwrap().unwrap()[..], b"cde");
        assert!(chunks.next().await.is_none());
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn first_write_commits_ok() {
        let (mut writer, head) = ResponseWriter::channel();
        writer.write_all(b"hello").await.unwrap();
        assert!(writer.is_committed());
        writer.shutdown().await.unwrap();

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hello");
    }

    #[tokio::test]
    async fn explicit_status_carries_headers() {
        let (mut writer, head) = ResponseWriter::channel();
        writer.headers_mut().insert("x-a", HeaderValue::from_static("1"));
        writer.headers_mut().append("x-a", HeaderValue::from_static("2"));
        writer.write_status(StatusCode::NOT_FOUND).unwrap();
        drop(writer);

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let values: Vec<_> = response.headers().get_all("x-a").iter().collect();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn second_status_is_rejected() {
        let (mut writer, _head) = ResponseWriter::channel();
        writer.write_status(StatusCode::ACCEPTED).unwrap();
        let err = writer.write_status(StatusCode::OK).unwrap_err();
        assert!(matches!(err, SinkError::AlreadyCommitted(StatusCode::ACCEPTED)));
    }

    #[tokio::test]
    async fn drop_commits_empty_ok() {
        let (writer, head) = ResponseWriter::channel();
        drop(writer);
        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn write_fails_once_client_is_gone() {
        let (mut writer, head) = ResponseWriter::channel();
        drop(head);
        writer.write_status(StatusCode::OK).unwrap();
        let err = writer.write_all(b"nobody listens").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn error_response_before_commit() {
        let (writer, head) = ResponseWriter::channel();
        let mut sink = OutboundSink::Plain(writer);
        sink.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        write_error(&mut sink, StatusCode::INTERNAL_SERVER_ERROR, "while dial: refused")
            .await
            .unwrap();
        drop(sink);

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(body_text(response).await, "while dial: refused\n");
    }

    #[tokio::test]
    async fn error_after_commit_is_not_written() {
        let (mut writer, head) = ResponseWriter::channel();
        writer.write_status(StatusCode::OK).unwrap();
        writer.write_all(b"partial").await.unwrap();
        write_error(&mut writer, StatusCode::INTERNAL_SERVER_ERROR, "boom").await.unwrap();
        drop(writer);

        let response = head.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "partial");
    }

    #[tokio::test]
    async fn body_only_sink_gets_just_the_message() {
        let mut sink = BodyOnly::new(Vec::new());
        assert!(sink.response_control().is_none());
        write_error(&mut sink, StatusCode::INTERNAL_SERVER_ERROR, "boom").await.unwrap();
        assert_eq!(sink.into_inner(), b"boom\n");
    }
}
