//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)              CLI flags
//!     → loader.rs (parse)             │
//!     → validation.rs (semantic)      │
//!     → ProxyConfig ◀─────────────────┘ (overrides)
//!     → immutable, shared with the dispatcher and engine
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never mutated afterwards
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, read_config, ConfigError};
pub use schema::{FeatureConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
