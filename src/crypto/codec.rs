//! Block cipher codec for chat payloads.
//!
//! # Responsibilities
//! - Pick AES-128/192/256 from the shared secret length
//! - Zero-pad plaintext to the block boundary and encrypt block by block
//! - Decrypt block by block, reporting malformed input as an error
//!
//! # Design Decisions
//! - No IV, no chaining: each 16-byte block is transformed on its own
//! - Padding is plain zero bytes and is not stripped on decode
//! - The codec is keyed once and is safe to share between handlers

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use thiserror::Error;

use crate::crypto::secret::{KeyError, SharedSecret};

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Errors produced while decoding ciphertext.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ends in a fragment shorter than one block.
    #[error("ciphertext length {len} is not a multiple of the {block_size}-byte block size")]
    PartialBlock { len: usize, block_size: usize },
}

#[derive(Clone)]
enum Cipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Cipher {
    fn encrypt(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Cipher::Aes128(c) => c.encrypt_block(block),
            Cipher::Aes192(c) => c.encrypt_block(block),
            Cipher::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt(&self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Cipher::Aes128(c) => c.decrypt_block(block),
            Cipher::Aes192(c) => c.decrypt_block(block),
            Cipher::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Stateless-per-key encoder/decoder for relay payloads.
#[derive(Clone)]
pub struct BlockCipherCodec {
    cipher: Cipher,
}

impl std::fmt::Debug for BlockCipherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self.cipher {
            Cipher::Aes128(_) => "AES-128",
            Cipher::Aes192(_) => "AES-192",
            Cipher::Aes256(_) => "AES-256",
        };
        f.debug_struct("BlockCipherCodec")
            .field("cipher", &variant)
            .finish()
    }
}

impl BlockCipherCodec {
    /// Key a codec from the shared secret.
    pub fn new(secret: &SharedSecret) -> Result<Self, KeyError> {
        Self::from_key(secret.as_bytes())
    }

    /// Key a codec from raw bytes (16, 24, or 32 long).
    pub fn from_key(key: &[u8]) -> Result<Self, KeyError> {
        let invalid = |_| KeyError::InvalidLength(key.len());
        let cipher = match key.len() {
            16 => Cipher::Aes128(Aes128::new_from_slice(key).map_err(invalid)?),
            24 => Cipher::Aes192(Aes192::new_from_slice(key).map_err(invalid)?),
            32 => Cipher::Aes256(Aes256::new_from_slice(key).map_err(invalid)?),
            other => return Err(KeyError::InvalidLength(other)),
        };
        Ok(Self { cipher })
    }

    /// Block size of the underlying cipher.
    pub fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Zero-pad `plaintext` to the block boundary and encrypt each block.
    pub fn encode(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = pad_to_block(plaintext, BLOCK_SIZE);
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt(block);
        }
        buf
    }

    /// Decrypt each block of `ciphertext`. Padding is left in place.
    pub fn decode(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(DecodeError::PartialBlock {
                len: ciphertext.len(),
                block_size: BLOCK_SIZE,
            });
        }
        let mut buf = ciphertext.to_vec();
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.decrypt(block);
        }
        Ok(buf)
    }
}

/// Append zero bytes until `data.len()` is a multiple of `block_size`.
pub fn pad_to_block(data: &[u8], block_size: usize) -> Vec<u8> {
    let remainder = data.len() % block_size;
    let padded_len = if remainder == 0 {
        data.len()
    } else {
        data.len() + block_size - remainder
    };
    let mut buf = Vec::with_capacity(padded_len);
    buf.extend_from_slice(data);
    buf.resize(padded_len, 0);
    buf
}
