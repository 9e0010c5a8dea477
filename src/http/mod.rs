//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (HTTP/1.1, router, dispatch)
//!     → compression.rs (gate: plain writer or gzip writer)
//!     → handler.rs (caller callback; default forwards via the engine)
//!     → sink.rs (status, headers, streamed body back to the client)
//! ```

pub mod compression;
pub mod handler;
pub mod resource;
pub mod server;
pub mod sink;

pub use compression::{CompressionGate, GzipSink};
pub use handler::{Handler, ProxyHandler};
pub use server::HttpServer;
pub use sink::{write_error, BodyOnly, OutboundSink, RelaySink, ResponseControl, ResponseWriter};
