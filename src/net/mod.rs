//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server role:
//!     listener.rs (acquire slot → accept)
//!         → connection.rs (id + shared writer)
//!         → relay handler task (slot released when it returns)
//!
//! Client role:
//!     bridge.rs (dial with timeout/backoff)
//!         → connection.rs
//!         → remote relay handler
//! ```
//!
//! # Design Decisions
//! - The accept loop stops pulling from the backlog while all slots are busy
//! - Each connection is identified by id, never by address
//! - Only write halves are shared; each handler owns its read half

pub mod bridge;
pub mod connection;
pub mod listener;

pub use bridge::{BridgeConnector, BridgeError};
pub use connection::{Connection, ConnectionId, ConnectionTracker};
pub use listener::{AdmissionListener, ConnectionPermit, ListenerError};
