//! Request handlers.
//!
//! A handler receives the (possibly compressing) sink and the inbound
//! request, and writes the whole response into the sink. The dispatcher
//! closes the sink once the handler returns.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::BoxFuture;

use crate::forward::{ForwardingEngine, RelayError};
use crate::http::resource::is_static_resource;
use crate::http::sink::{write_error, OutboundSink};
use crate::net::resolver::{request_host, resolve};

/// Caller-supplied request callback.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, sink: &'a mut OutboundSink, request: Request<Body>) -> BoxFuture<'a, ()>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, sink: &'a mut OutboundSink, request: Request<Body>) -> BoxFuture<'a, ()> {
        (**self).call(sink, request)
    }
}

/// Default handler: forwards every request to the backend named by its host.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyHandler {
    engine: ForwardingEngine,
}

impl ProxyHandler {
    pub fn new(engine: ForwardingEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ForwardingEngine {
        &self.engine
    }

    async fn handle(&self, sink: &mut OutboundSink, request: Request<Body>) {
        let backend = resolve(&request_host(&request));
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        tracing::debug!(
            backend = %backend,
            method = %method,
            path = %path,
            static_resource = is_static_resource(&path),
            compressed = sink.is_compressed(),
            "Relaying request"
        );

        match self.engine.relay(sink, request, &backend).await {
            Ok(written) => {
                tracing::debug!(backend = %backend, path = %path, bytes = written, "Relay complete");
            }
            Err(err) => {
                report(&err, &backend, &path);
                if let Err(e) = write_error(sink, err.status_code(), &err.to_string()).await {
                    tracing::debug!(error = %e, "Failed to write error response");
                }
            }
        }
    }
}

fn report(err: &RelayError, backend: &str, path: &str) {
    if err.is_fatal() {
        tracing::error!(
            backend = %backend,
            path = %path,
            kind = %err.kind(),
            error = %err,
            "Backend violated the protocol, relay aborted"
        );
    } else {
        tracing::warn!(
            backend = %backend,
            path = %path,
            kind = %err.kind(),
            bytes = err.bytes_written(),
            error = %err,
            "Relay failed"
        );
    }
}

impl Handler for ProxyHandler {
    fn call<'a>(&'a self, sink: &'a mut OutboundSink, request: Request<Body>) -> BoxFuture<'a, ()> {
        Box::pin(self.handle(sink, request))
    }
}
