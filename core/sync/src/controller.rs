//! Session controller: owns the encryption password and runs load/save.
//!
//! Loads and saves are strictly sequential. Every operation takes the
//! single-slot `op_lock` before touching the store, so a second save issued
//! while one is in flight waits behind it instead of racing it to the store.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use sealcal_common::{Error, EventCollection, Result, SensitiveBytes};
use sealcal_crypto::{derive_key, EncryptedEnvelope, KdfParams, Password, Salt, SessionKey};
use sealcal_storage::{EventStore, SessionGateway};

use crate::state::SessionState;

/// Secret material for one session. Dropping it zeroizes both fields.
struct Session {
    state: SessionState,
    password: Option<Password>,
    /// Key derived for the most recently loaded or saved envelope.
    cached_key: Option<(Salt, SessionKey)>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            password: None,
            cached_key: None,
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Unauthenticated;
        self.password = None;
        self.cached_key = None;
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::NotPermitted(format!(
                "Cannot move from {} to {}",
                self.state, next
            )));
        }
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Orchestrates the encrypted round-trip between an event collection and
/// an [`EventStore`].
pub struct SyncController<S: EventStore + ?Sized = dyn EventStore> {
    store: Arc<S>,
    session: RwLock<Session>,
    op_lock: Mutex<()>,
}

impl<S: EventStore + ?Sized> SyncController<S> {
    /// Create a controller in the `Unauthenticated` state.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            session: RwLock::new(Session::new()),
            op_lock: Mutex::new(()),
        }
    }

    /// The store this controller reads and writes.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.session.read().await.state
    }

    /// Record that a server session exists.
    ///
    /// # Errors
    /// - `NotPermitted` unless the controller is `Unauthenticated`
    pub async fn mark_authenticated(&self) -> Result<()> {
        let mut session = self.session.write().await;
        if session.state == SessionState::AwaitingPassword {
            return Ok(());
        }
        session.transition(SessionState::AwaitingPassword)
    }

    /// Supply the encryption password.
    ///
    /// Accepted from `AwaitingPassword`, and from `Unauthenticated` for
    /// stores without a server session.
    ///
    /// # Errors
    /// - `InvalidInput` if `password` is empty
    /// - `NotPermitted` if the session is already unlocked
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let password = Password::new(password)?;
        let mut session = self.session.write().await;
        if session.state.is_unlocked() {
            return Err(Error::NotPermitted("Session already unlocked".to_string()));
        }
        session.transition(SessionState::Unlocked)?;
        session.password = Some(password);
        session.cached_key = None;
        info!("Session unlocked");
        Ok(())
    }

    /// Open a server session through `gateway` and await the password.
    pub async fn login(&self, gateway: &dyn SessionGateway, account_password: &str) -> Result<()> {
        gateway.login(account_password).await?;
        self.mark_authenticated().await
    }

    /// Discard the password and derived keys and return to
    /// `Unauthenticated`.
    ///
    /// Waits for an in-flight load or save to finish first.
    pub async fn clear(&self) {
        let _guard = self.op_lock.lock().await;
        self.session.write().await.reset();
        info!("Session cleared");
    }

    /// Clear local state, then close the server session.
    ///
    /// The local key is gone even if the server call fails.
    pub async fn logout(&self, gateway: &dyn SessionGateway) -> Result<()> {
        self.clear().await;
        gateway.logout().await
    }

    /// Fetch, decrypt and parse the stored collection.
    ///
    /// # Returns
    /// - An empty collection if the store has no data yet; nothing is
    ///   decrypted in that case
    ///
    /// # Errors
    /// - `NotPermitted` unless the session is `Unlocked`
    /// - `DecryptionFailed` on a wrong password or altered envelope; the
    ///   session is reset to `Unauthenticated`
    /// - `MalformedEnvelope` / `UnsupportedVersion` for undecodable records
    /// - `SyncFailed` if the store could not be read
    pub async fn load(&self) -> Result<EventCollection> {
        let _guard = self.op_lock.lock().await;
        let password = self.begin(SessionState::Loading).await?;

        let result = self.fetch_and_open(password).await;
        self.finish(&result).await;

        let (events, _) = result?;
        info!("Loaded {} events from {}", events.len(), self.store.name());
        Ok(events)
    }

    /// Encrypt `events` under a fresh salt and nonce and replace the stored
    /// envelope.
    ///
    /// # Errors
    /// - `NotPermitted` unless the session is `Unlocked`
    /// - `SyncFailed` if the store rejected the write; the session and
    ///   password are kept so the caller can retry
    pub async fn save(&self, events: &EventCollection) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let password = self.begin(SessionState::Saving).await?;

        let result = self.seal_and_push(events, password).await;
        self.finish(&result).await;

        result?;
        info!("Saved {} events to {}", events.len(), self.store.name());
        Ok(())
    }

    /// Move into `next` and hand out the password for the operation.
    async fn begin(&self, next: SessionState) -> Result<Password> {
        let mut session = self.session.write().await;
        if session.state != SessionState::Unlocked {
            return Err(Error::NotPermitted(format!(
                "Session is {}, password required",
                session.state
            )));
        }
        let password = session
            .password
            .clone()
            .ok_or_else(|| Error::NotPermitted("No password in session".to_string()))?;
        session.transition(next)?;
        Ok(password)
    }

    /// Settle the session after an operation.
    async fn finish<T>(&self, result: &Result<(T, Option<(Salt, SessionKey)>)>) {
        let mut session = self.session.write().await;
        match result {
            Ok((_, derived)) => {
                if let Some((salt, key)) = derived {
                    session.cached_key = Some((*salt, key.clone()));
                }
                session.state = SessionState::Unlocked;
            }
            Err(e) if e.invalidates_session() => {
                warn!("Resetting session: {}", e);
                session.reset();
            }
            Err(e) => {
                debug!("Operation failed, session kept: {}", e);
                session.state = SessionState::Unlocked;
            }
        }
    }

    async fn cached_key_for(&self, salt: &Salt) -> Option<SessionKey> {
        let session = self.session.read().await;
        match &session.cached_key {
            Some((cached, key)) if cached == salt => Some(key.clone()),
            _ => None,
        }
    }

    async fn fetch_and_open(
        &self,
        password: Password,
    ) -> Result<(EventCollection, Option<(Salt, SessionKey)>)> {
        let record = self.store.fetch().await.map_err(into_sync_failure)?;
        let Some(record) = record else {
            debug!("No stored envelope, starting with an empty collection");
            return Ok((EventCollection::new(), None));
        };

        let envelope = EncryptedEnvelope::from_record(&record)?;
        let salt = envelope.salt;
        let cached = self.cached_key_for(&salt).await;
        if cached.is_some() {
            debug!("Reusing derived key for unchanged envelope");
        }

        let (plaintext, key) = blocking(move || {
            let key = match cached {
                Some(key) => key,
                None => envelope.derive_key(&password)?,
            };
            let plaintext = envelope.open_with_key(&key).map_err(|e| match e {
                Error::AuthenticationFailure => Error::DecryptionFailed,
                other => other,
            })?;
            Ok((SensitiveBytes::new(plaintext), key))
        })
        .await?;

        let events = EventCollection::from_bytes(plaintext.as_bytes())?;
        Ok((events, Some((salt, key))))
    }

    async fn seal_and_push(
        &self,
        events: &EventCollection,
        password: Password,
    ) -> Result<((), Option<(Salt, SessionKey)>)> {
        let plaintext = SensitiveBytes::new(events.to_bytes()?);

        let (envelope, key) = blocking(move || {
            let salt = Salt::generate();
            let key = derive_key(password.as_bytes(), salt.as_bytes(), &KdfParams::V1)?;
            let envelope = EncryptedEnvelope::seal_with_key(plaintext.as_bytes(), salt, &key)?;
            Ok((envelope, key))
        })
        .await?;

        self.store
            .push(&envelope.to_record())
            .await
            .map_err(into_sync_failure)?;

        Ok(((), Some((envelope.salt, key))))
    }
}

/// Run CPU-bound crypto off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Crypto(format!("Crypto task failed: {}", e)))?
}

/// Transport failures surface as `SyncFailed`; everything else is kept.
fn into_sync_failure(err: Error) -> Error {
    match err {
        Error::Network(msg) => Error::SyncFailed(msg),
        Error::Io(e) => Error::SyncFailed(e.to_string()),
        other => other,
    }
}
