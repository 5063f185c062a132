//! Common error types for sealcal.

use thiserror::Error;

/// Top-level error type for sealcal operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed salt, nonce, key or password supplied locally.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport text could not be decoded.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Envelope record is missing a field or carries an undecodable one.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope was written under a scheme this client does not know.
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    /// Authentication tag did not verify.
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Stored events could not be decrypted with the session password.
    #[error("Decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    /// The remote store could not be read or rejected a write.
    #[error("Sync failed: {0}")]
    SyncFailed(String),

    /// The remote store refused the request as sent; resending it cannot help.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Cryptographic primitive failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Transport-level failure talking to the remote store.
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation not permitted in the current session state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation could succeed.
    ///
    /// Only transport failures qualify. Retrying a decryption with the same
    /// password, or a decode of the same bytes, gives the same answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SyncFailed(_) | Error::Network(_) | Error::Io(_))
    }

    /// Whether this error means the session key can no longer be trusted.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Error::DecryptionFailed | Error::AuthenticationFailure)
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::AuthenticationFailure | Error::DecryptionFailed => {
                "Failed to decrypt calendar. Please check your password."
            }
            Error::MalformedInput(_)
            | Error::MalformedEnvelope(_)
            | Error::UnsupportedVersion(_)
            | Error::Serialization(_) => "Unable to read saved data.",
            Error::SyncFailed(_) | Error::Rejected(_) | Error::Network(_) | Error::Io(_) => {
                "Failed to save events. Please try again."
            }
            Error::NotPermitted(_) => "Session expired. Please log in again.",
            Error::InvalidInput(_) | Error::Crypto(_) => "Something went wrong.",
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
