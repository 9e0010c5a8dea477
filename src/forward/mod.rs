//! Forwarding subsystem: relays one request to one backend.
//!
//! # Data Flow
//! ```text
//! Request<Body> + backend "host:port"
//!     → engine.rs (dial, replay, stream back)
//!         ├─ headers.rs (header + cookie translation)
//!         └─ pipeline.rs (optional body hooks)
//!     → Ok(bytes written) | RelayError (error.rs)
//! ```

pub mod engine;
pub mod error;
pub mod headers;
pub mod pipeline;

pub use engine::ForwardingEngine;
pub use error::{BoxError, RelayError, RelayErrorKind};
pub use pipeline::{Passthrough, Pipeline};
