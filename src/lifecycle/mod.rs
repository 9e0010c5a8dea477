//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SIGTERM / SIGINT → signals.rs → Shutdown::trigger (shutdown.rs)
//!     → dispatcher stops accepting → open connections drain → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
