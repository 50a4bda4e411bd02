//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound dial (bridge):
//!     → timeouts.rs (connect deadline)
//!     → On failure: BridgeConfig::retry_delay, then redial
//!
//! Broadcast write:
//!     → timeouts.rs (optional write deadline; expiry counts as a write error)
//! ```
//!
//! # Design Decisions
//! - A zero duration means "no deadline"
//! - A timed-out write is reported exactly like a failed one, so eviction
//!   stays the only consequence

pub mod timeouts;
