//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Key codec → Spawn registry → Bind/dial → Serve
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Listeners stop accepting → run() returns
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Live sessions are not drained; the process exits once listeners stop

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{ChatNode, NodeError, RunningNode};
