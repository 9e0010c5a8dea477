//! The forwarding engine: one inbound request, one backend connection.
//!
//! # Data Flow
//! ```text
//! dial backend (fresh TCP connection, HTTP/1.1 handshake)
//!     → build outbound request (method, target, Host, headers, cookies)
//!     → send, wait for response head
//!     → status + headers into the sink (when it supports them)
//!     → stream body chunks into the sink
//!     → body dropped, then connection closed
//! ```
//!
//! # Design Decisions
//! - No pooling, no retry: a relay owns exactly one connection and closes it
//!   on every exit path
//! - The request target is forwarded as received (origin form); it is not
//!   rebuilt into an absolute URL
//! - Header propagation failures are logged and never stop the body
//! - No timeouts here; the dispatcher owns deadlines

use std::io;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{request, response, HeaderValue, Request, Response, Uri};
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::config::FeatureConfig;
use crate::forward::error::RelayError;
use crate::forward::headers::{copy_headers, translate_cookies, translate_request_headers};
use crate::forward::pipeline::{Passthrough, Pipeline};
use crate::http::sink::{RelaySink, ResponseControl};
use crate::net::resolver::parts_host;
use crate::observability::metrics;

/// Stateless relay engine. Cheap to copy and safe to share across tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingEngine {
    local_caching: bool,
}

impl ForwardingEngine {
    pub fn new(features: &FeatureConfig) -> Self {
        Self::with_local_caching(features.local_caching)
    }

    pub fn with_local_caching(local_caching: bool) -> Self {
        Self { local_caching }
    }

    pub fn local_caching(&self) -> bool {
        self.local_caching
    }

    /// Relay `request` to `backend` (`host:port`) and stream the response
    /// into `sink`. Returns the number of body bytes written.
    pub async fn relay<S: RelaySink>(
        &self,
        sink: &mut S,
        request: Request<Body>,
        backend: &str,
    ) -> Result<u64, RelayError> {
        self.relay_with(sink, request, backend, &Passthrough).await
    }

    /// Like [`relay`](Self::relay), with body hooks.
    pub async fn relay_with<S, P>(
        &self,
        sink: &mut S,
        request: Request<Body>,
        backend: &str,
        pipeline: &P,
    ) -> Result<u64, RelayError>
    where
        S: RelaySink,
        P: Pipeline + ?Sized,
    {
        let started = Instant::now();
        let result = self.relay_once(sink, request, backend, pipeline).await;
        metrics::record_relay(&result, started);
        result
    }

    async fn relay_once<S, P>(
        &self,
        sink: &mut S,
        request: Request<Body>,
        backend: &str,
        pipeline: &P,
    ) -> Result<u64, RelayError>
    where
        S: RelaySink,
        P: Pipeline + ?Sized,
    {
        let mut connection = BackendConnection::dial(backend).await?;
        let outbound = self.build_outbound(request, pipeline)?;

        tracing::debug!(
            backend = %backend,
            method = %outbound.method(),
            target = %outbound.uri(),
            "Sending request to backend"
        );

        let response = connection.send(outbound).await?;
        let (parts, body) = response.into_parts();

        tracing::debug!(backend = %backend, status = %parts.status, "Backend responded");

        if let Some(control) = sink.response_control() {
            propagate_head(control, &parts);
        }

        stream_body(sink, body, pipeline).await
    }

    /// Build the outbound request from the inbound one.
    pub fn build_outbound<P: Pipeline + ?Sized>(
        &self,
        request: Request<Body>,
        pipeline: &P,
    ) -> Result<Request<Body>, RelayError> {
        let (parts, body) = request.into_parts();
        let body = pipeline.request_body(body).map_err(RelayError::RequestPipe)?;

        let mut outbound = Request::builder()
            .method(parts.method.clone())
            .uri(request_target(&parts.uri))
            .body(body)?;
        *outbound.headers_mut() = self.outbound_headers(&parts);
        Ok(outbound)
    }

    fn outbound_headers(&self, parts: &request::Parts) -> axum::http::HeaderMap {
        let mut headers = translate_request_headers(&parts.headers, self.local_caching);
        translate_cookies(&parts.headers, &mut headers);

        let host = parts_host(parts);
        if !host.is_empty() {
            match HeaderValue::from_str(&host) {
                Ok(value) => {
                    headers.insert(HOST, value);
                }
                Err(e) => tracing::debug!(host = %host, error = %e, "Host not usable as header"),
            }
        }
        headers
    }
}

/// Origin-form target (`/path?query`) of an inbound URI.
pub fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}

fn propagate_head(control: &mut dyn ResponseControl, parts: &response::Parts) {
    copy_headers(&parts.headers, control.headers_mut());
    if let Err(e) = control.write_status(parts.status) {
        tracing::warn!(status = %parts.status, error = %e, "Could not write response status");
    }
}

async fn stream_body<S, P>(sink: &mut S, body: Incoming, pipeline: &P) -> Result<u64, RelayError>
where
    S: RelaySink,
    P: Pipeline + ?Sized,
{
    let mut written: u64 = 0;
    let mut chunks = Body::new(body).into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| RelayError::stream(written, e))?;
        let chunk = pipeline
            .response_chunk(chunk)
            .map_err(|e| RelayError::stream(written, e))?;

        let mut remaining = &chunk[..];
        while !remaining.is_empty() {
            let n = sink
                .write(remaining)
                .await
                .map_err(|e| RelayError::stream(written, e))?;
            if n == 0 {
                return Err(RelayError::stream(written, io::Error::from(io::ErrorKind::WriteZero)));
            }
            written += n as u64;
            remaining = &remaining[n..];
        }
    }

    Ok(written)
}

/// One HTTP/1.1 connection to a backend. Closed when dropped.
struct BackendConnection {
    address: String,
    sender: http1::SendRequest<Body>,
    driver: JoinHandle<()>,
}

impl BackendConnection {
    async fn dial(address: &str) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| RelayError::Dial {
                address: address.to_string(),
                source,
            })?;

        let (sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
            .await
            .map_err(|source| RelayError::Handshake {
                address: address.to_string(),
                source,
            })?;

        let backend = address.to_string();
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(backend = %backend, error = %e, "Backend connection error");
            }
        });

        tracing::trace!(backend = %address, "Backend connection opened");
        Ok(Self {
            address: address.to_string(),
            sender,
            driver,
        })
    }

    async fn send(&mut self, request: Request<Body>) -> Result<Response<Incoming>, RelayError> {
        self.sender.ready().await.map_err(RelayError::Protocol)?;
        self.sender.send_request(request).await.map_err(RelayError::Protocol)
    }
}

impl Drop for BackendConnection {
    fn drop(&mut self) {
        self.driver.abort();
        tracing::trace!(backend = %self.address, "Backend connection closed");
    }
}
