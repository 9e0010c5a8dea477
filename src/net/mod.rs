//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (ID + tracking for drain on shutdown)
//!     → Hand off to HTTP layer
//!
//! Outbound:
//!     Host value → resolver.rs (host:port) → dialed by the forwarding engine
//! ```

pub mod connection;
pub mod listener;
pub mod resolver;

pub use listener::{Listener, ListenerError};
pub use resolver::{request_host, resolve};
