//! Shared secret handling.

use std::ffi::OsString;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Environment variable consulted before prompting for the secret.
pub const SECRET_ENV_VAR: &str = "LANCHAT_SECRET";

/// Key lengths accepted by the block cipher (AES-128/192/256).
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Errors raised while establishing the shared key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The secret is not 16, 24, or 32 bytes long.
    #[error("shared secret must be 16, 24, or 32 bytes long, got {0}")]
    InvalidLength(usize),

    /// The secret could not be read from the terminal.
    #[error("couldn't read shared secret: {0}")]
    Prompt(#[source] std::io::Error),

    /// The environment variable is set but cannot be used as key bytes.
    #[error("{0} is set but is not valid unicode")]
    NotUnicode(&'static str),
}

/// Symmetric key shared by every cooperating peer.
///
/// Immutable once built; the bytes are wiped when the last copy is dropped.
#[derive(Clone)]
pub struct SharedSecret {
    bytes: Zeroizing<Vec<u8>>,
}

impl SharedSecret {
    /// Build a secret, rejecting lengths the cipher cannot use.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(bytes.into());
        if !VALID_KEY_LENGTHS.contains(&bytes.len()) {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Read the secret from `LANCHAT_SECRET` if set.
    ///
    /// A set value is never ignored: its raw bytes become the key, and a
    /// value that cannot be a key is an error.
    pub fn from_env() -> Option<Result<Self, KeyError>> {
        std::env::var_os(SECRET_ENV_VAR).map(Self::from_os_value)
    }

    fn from_os_value(value: OsString) -> Result<Self, KeyError> {
        #[cfg(unix)]
        let bytes = {
            use std::os::unix::ffi::OsStringExt;
            value.into_vec()
        };
        #[cfg(not(unix))]
        let bytes = value
            .into_string()
            .map_err(|_| KeyError::NotUnicode(SECRET_ENV_VAR))?
            .into_bytes();

        Self::new(bytes)
    }

    /// Prompt for the secret on the controlling terminal without echo.
    pub fn prompt() -> Result<Self, KeyError> {
        let line = rpassword::prompt_password("AES shared secret (must be of length 16, 24, or 32): ")
            .map_err(KeyError::Prompt)?;
        Self::new(line)
    }

    /// Key material.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a constructed secret; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_aes_key_lengths() {
        for len in VALID_KEY_LENGTHS {
            let secret = SharedSecret::new(vec![7u8; len]).unwrap();
            assert_eq!(secret.len(), len);
        }
    }

    #[test]
    fn rejects_other_lengths() {
        for len in [0, 1, 15, 17, 31, 33, 64] {
            let err = SharedSecret::new(vec![0u8; len]).unwrap_err();
            assert!(matches!(err, KeyError::InvalidLength(n) if n == len));
        }
    }

    #[cfg(unix)]
    #[test]
    fn env_value_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::OsStringExt;

        let mut raw = vec![0xffu8; 8];
        raw.extend_from_slice(b"abcdefgh");
        let secret = SharedSecret::from_os_value(OsString::from_vec(raw.clone())).unwrap();
        assert_eq!(secret.as_bytes(), &raw[..]);

        let err = SharedSecret::from_os_value(OsString::from_vec(vec![0xfe; 5])).unwrap_err();
        assert!(matches!(err, KeyError::InvalidLength(5)));
    }

    #[test]
    fn env_value_of_valid_length_is_accepted() {
        let secret = SharedSecret::from_os_value(OsString::from("0123456789abcdef0123456789abcdef")).unwrap();
        assert_eq!(secret.len(), 32);
    }

    #[test]
    fn debug_does_not_leak_key() {
        let secret = SharedSecret::new("0123456789abcdef").unwrap();
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("16"));
    }
}
