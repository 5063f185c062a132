//! Key types with secure memory handling.
//!
//! Key and password types zeroize their memory on drop so that session
//! secrets do not persist after logout.

use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use sealcal_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of key-derivation salts in bytes.
pub const SALT_LENGTH: usize = 16;

/// Length of AES-GCM nonces in bytes (96-bit).
pub const NONCE_LENGTH: usize = 12;

/// Symmetric key derived from the session password.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; KEY_LENGTH],
}

impl SessionKey {
    /// Create a session key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}

/// Encryption password held for the lifetime of a session.
///
/// Every save derives a key under a fresh salt, so the password itself has to
/// stay available until logout.
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    /// Wrap a password.
    ///
    /// # Errors
    /// - Returns error if the password is empty
    pub fn new(password: impl Into<String>) -> Result<Self> {
        let password = Zeroizing::new(password.into());
        if password.is_empty() {
            return Err(Error::InvalidInput("Password cannot be empty".to_string()));
        }
        Ok(Self(password))
    }

    /// Get the UTF-8 bytes fed to the key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

/// Salt for key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly [`SALT_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SALT_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Invalid salt length: expected {}, got {}",
                SALT_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

/// Nonce for a single AES-GCM encryption.
///
/// Must never be reused under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_LENGTH]);

impl Nonce {
    /// Generate a random nonce.
    pub fn generate() -> Self {
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self(nonce)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; NONCE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly [`NONCE_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; NONCE_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Invalid nonce length: expected {}, got {}",
                NONCE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Get the nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_LENGTH] {
        &self.0
    }
}
