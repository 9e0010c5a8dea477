//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Accept inbound connections from the bounded listener
//! - Serve HTTP/1.1 on each connection through an Axum router
//! - Put the compression gate in front of the handler for every request
//! - Run the handler and return its response head as soon as it is committed
//! - Stop accepting on shutdown, close connections gracefully and drain them
//! - Abort a handler whose client went away mid-response

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, BodyDataStream, Bytes},
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures_util::Stream;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tower::Service;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::forward::ForwardingEngine;
use crate::http::compression::CompressionGate;
use crate::http::handler::{Handler, ProxyHandler};
use crate::http::sink::ResponseWriter;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Application state injected into the dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub gate: CompressionGate,
    pub handler: Arc<dyn Handler>,
}

/// HTTP server for the proxy. Owns its router and, while running, the listener.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Server that forwards every request with the default [`ProxyHandler`].
    pub fn new(config: ProxyConfig) -> Self {
        let handler = ProxyHandler::new(ForwardingEngine::new(&config.features));
        Self::with_handler(config, handler)
    }

    /// Server that dispatches every request to `handler`.
    pub fn with_handler<H: Handler>(config: ProxyConfig, handler: H) -> Self {
        let state = AppState {
            gate: CompressionGate::new(config.features.compression),
            handler: Arc::new(handler),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let router = Router::new().fallback(dispatch).with_state(state);
        let router = match config.timeouts.response_head_secs {
            Some(secs) => router.layer(TimeoutLayer::new(Duration::from_secs(secs))),
            None => router,
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// Serve connections from `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            compression = self.config.features.compression,
            keepalive = self.config.features.keepalive,
            local_caching = self.config.features.local_caching,
            "HTTP server starting"
        );

        let tracker = ConnectionTracker::new();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            };

            let (stream, peer, permit) = match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let router = self.router.clone();
            let guard = tracker.track();
            let connection_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let _permit = permit;
                serve_connection(stream, peer, router, guard, connection_shutdown).await;
            });
        }

        drop(listener);

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        if tracker.drain(grace).await {
            tracing::info!("HTTP server stopped");
        } else {
            tracing::warn!(
                open_connections = tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Keeps an inbound connection counted by the tracker while a handler task
/// spawned for one of its requests is still running.
#[derive(Clone)]
struct ConnectionLease(Arc<ConnectionGuard>);

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    guard: ConnectionGuard,
    mut shutdown: broadcast::Receiver<()>,
) {
    let connection_id = guard.id();
    tracing::trace!(connection_id = %connection_id, peer = %peer, "Serving connection");

    let lease = ConnectionLease(Arc::new(guard));
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(lease.clone());
        let mut router = router.clone();
        async move { router.call(request.map(Body::new)).await }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = false;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = shutdown.recv(), if !closing => {
                // Finishes an in-flight response, closes an idle connection now.
                tracing::trace!(connection_id = %connection_id, "Closing connection for shutdown");
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection_id = %connection_id, peer = %peer, error = %e, "Connection ended with error");
    }
}

/// Per-request entry point: gate, then handler, then stream the response.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (writer, head) = ResponseWriter::channel();
    let mut sink = state.gate.wrap(&request, writer);
    let handler = Arc::clone(&state.handler);
    let lease = request.extensions().get::<ConnectionLease>().cloned();

    let task = tokio::spawn(async move {
        let _lease = lease;
        handler.call(&mut sink, request).await;
        // Closes the compressor too, flushing its trailer.
        if let Err(e) = sink.shutdown().await {
            tracing::debug!(error = %e, "Failed to close response sink");
        }
    });
    let guard = AbortOnDrop(Some(task.abort_handle()));

    match head.await {
        Ok(response) => response.map(|body| {
            Body::from_stream(TaskBoundBody {
                inner: body.into_data_stream(),
                task: guard,
            })
        }),
        Err(_) => {
            tracing::error!("Handler ended without producing a response");
            (StatusCode::INTERNAL_SERVER_ERROR, "handler ended without producing a response\n")
                .into_response()
        }
    }
}

/// Aborts the handler task when dropped, unless disarmed.
struct AbortOnDrop(Option<AbortHandle>);

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.0.take();
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

/// Response body tied to the handler task that produces it.
///
/// If the server drops the body before its end (the client went away), the
/// task is aborted, which closes the backend connection even when the
/// backend has gone quiet and no write would ever fail.
struct TaskBoundBody {
    inner: BodyDataStream,
    task: AbortOnDrop,
}

impl Stream for TaskBoundBody {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = ready!(Pin::new(&mut this.inner).poll_next(cx));
        if next.is_none() {
            this.task.disarm();
        }
        Poll::Ready(next)
    }
}
