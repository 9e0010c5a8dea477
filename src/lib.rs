//! Single-hop HTTP forwarding proxy library.
//!
//! Every inbound request is relayed over a fresh connection to the backend
//! named by its host, and the response is streamed back, gzipped on the way
//! when the client accepts it.

pub mod cli;
pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use forward::{ForwardingEngine, RelayError, RelayErrorKind};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
