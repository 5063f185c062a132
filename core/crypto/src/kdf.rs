//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The parameters are part of the envelope scheme: a client deriving with
//! different parameters cannot open envelopes written by another. They are
//! therefore bound to the envelope version instead of being configurable.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::keys::{SessionKey, KEY_LENGTH};
use sealcal_common::{Error, Result};

/// Parameters for PBKDF2-HMAC-SHA256 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Number of HMAC iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters of envelope scheme 1.
    pub const V1: Self = Self { iterations: 100_000 };

    /// Parameters for a given envelope scheme version.
    ///
    /// # Errors
    /// - `UnsupportedVersion` for unknown versions
    pub fn for_version(version: u32) -> Result<Self> {
        match version {
            1 => Ok(Self::V1),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::V1
    }
}

/// Derive a 256-bit AES-GCM key from a password and salt.
///
/// # Preconditions
/// - `password` must not be empty
/// - `salt` must not be empty
/// - `params.iterations` must be non-zero
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - `InvalidInput` if any precondition is violated
///
/// # Security
/// - Password is not stored or logged
pub fn derive_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<SessionKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }
    if salt.is_empty() {
        return Err(Error::InvalidInput("Salt cannot be empty".to_string()));
    }
    if params.iterations == 0 {
        return Err(Error::InvalidInput(
            "KDF iteration count cannot be zero".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut key_bytes);

    let key = SessionKey::from_bytes(key_bytes);
    zeroize::Zeroize::zeroize(&mut key_bytes);
    Ok(key)
}
