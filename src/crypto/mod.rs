//! Symmetric encryption subsystem.
//!
//! # Data Flow
//! ```text
//! secret source (env / prompt)
//!     → secret.rs (length check, zeroized storage)
//!     → codec.rs (AES keyed once, shared via Arc)
//!
//! Local line  → codec.encode → ciphertext → registry broadcast
//! Remote read → registry broadcast (raw) + codec.decode → display
//! ```
//!
//! # Design Decisions
//! - Zero padding and per-block transformation are wire format; peers built
//!   from the same protocol must interoperate byte for byte
//! - Decode never panics: malformed input becomes a `DecodeError`
//! - Remote traffic is relayed as opaque ciphertext, never re-encrypted

pub mod codec;
pub mod secret;

pub use codec::{pad_to_block, BlockCipherCodec, DecodeError, BLOCK_SIZE};
pub use secret::{KeyError, SharedSecret, SECRET_ENV_VAR};
