//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher, engine
//!     → logging.rs (tracing subscriber, structured fields)
//!     → metrics.rs (relay counters and latency)
//! ```

pub mod logging;
pub mod metrics;
