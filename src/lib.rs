//! LAN chat relay with a shared-key block cipher.
//!
//! Remote peers exchange ciphertext through a relay node; the operator joins
//! through a local plain-text session and sees every message decrypted.

// Core subsystems
pub mod crypto;
pub mod net;
pub mod relay;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ChatConfig;
pub use crypto::{BlockCipherCodec, SharedSecret};
pub use lifecycle::{ChatNode, NodeError, RunningNode, Shutdown};
pub use relay::RegistryHandle;
