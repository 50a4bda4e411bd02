//! Encrypted relay core.
//!
//! # Data Flow
//! ```text
//! remote peer ──ciphertext──► RemoteHandler ──Broadcast(raw)──► registry ──► other remotes
//!                                   └──decode──► ChatDisplay
//!
//! local session ──line──► LocalHandler ──encode──► Broadcast ──► registry ──► all remotes
//!                              └──echo──► ChatDisplay
//! ```
//!
//! # Design Decisions
//! - The registry is the only owner of connection lists (actor + channel)
//! - Handlers hold a `Registration` guard; dropping it deregisters
//! - Local sessions never receive relay traffic

pub mod display;
pub mod local;
pub mod registry;
pub mod remote;

#[cfg(test)]
mod testing;

pub use display::{ChatDisplay, ConsoleDisplay, RecordingDisplay};
pub use local::LocalHandler;
pub use registry::{
    ConnectionClass, Registration, RegistryHandle, RegistrySnapshot, RelayMessage,
};
pub use remote::{RemoteEnd, RemoteHandler};
