//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flag overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ChatConfig (validated, immutable)
//!     → passed by value into ChatNode
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the node starts
//! - All fields have defaults so a node can run with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BridgeConfig, ChatConfig, ListenerConfig, LocalConfig, ModeConfig, ObservabilityConfig,
    Protocol, RelayConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
