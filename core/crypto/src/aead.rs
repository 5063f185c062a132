//! Authenticated encryption using AES-256-GCM.
//!
//! Output follows the standard AES-GCM convention: ciphertext with the
//! 16-byte authentication tag appended. The nonce travels separately in the
//! envelope.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit};

use crate::keys::{Nonce, SessionKey};
use sealcal_common::{Error, Result};

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn cipher(key: &SessionKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt plaintext under `key` and `nonce`.
///
/// # Preconditions
/// - `nonce` must never have been used with `key` before
///
/// # Postconditions
/// - Returns ciphertext || tag, `plaintext.len() + TAG_SIZE` bytes
///
/// # Security
/// - Caller is responsible for nonce uniqueness
pub fn encrypt(key: &SessionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    cipher(key)
        .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext || tag under `key` and `nonce`.
///
/// # Errors
/// - `AuthenticationFailure` if the tag does not verify. A wrong key,
///   corrupted bytes and deliberate tampering are indistinguishable here.
///
/// # Security
/// - Authenticates before returning any plaintext
pub fn decrypt(key: &SessionKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailure);
    }

    cipher(key)
        .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|_| Error::AuthenticationFailure)
}
