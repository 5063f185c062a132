//! Store and session traits.

use async_trait::async_trait;

use sealcal_common::{EnvelopeRecord, Result};

/// Remote holder of the encrypted event envelope.
///
/// The store keeps exactly one envelope per user. Writes replace it
/// wholesale; there is no merge and no partial update.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Get the store name (e.g., "http", "local", "memory").
    fn name(&self) -> &str;

    /// Read the stored envelope.
    ///
    /// # Returns
    /// - `Ok(None)` if nothing has been saved yet
    /// - `Ok(Some(record))` otherwise; the record is not validated here
    ///
    /// # Errors
    /// - `SyncFailed` / `Network` if the store is unreachable or errors
    /// - `NotPermitted` if the server session is missing or expired
    async fn fetch(&self) -> Result<Option<EnvelopeRecord>>;

    /// Replace the stored envelope.
    ///
    /// # Postconditions
    /// - On success, a subsequent `fetch` returns `record`
    ///
    /// # Errors
    /// - `SyncFailed` / `Network` if the write was not accepted
    /// - `NotPermitted` if the server session is missing or expired
    async fn push(&self, record: &EnvelopeRecord) -> Result<()>;
}

/// Server-side session boundary.
///
/// The account password exchanged here is distinct from the encryption
/// password and is the only secret that leaves the process.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Open a server session.
    ///
    /// # Errors
    /// - `NotPermitted` if the server rejects the credentials
    async fn login(&self, account_password: &str) -> Result<()>;

    /// Close the server session.
    async fn logout(&self) -> Result<()>;
}
