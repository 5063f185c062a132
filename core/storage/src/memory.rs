//! In-memory store for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::provider::{EventStore, SessionGateway};
use sealcal_common::{EnvelopeRecord, Error, Result};

#[derive(Debug, Default)]
struct State {
    record: Option<EnvelopeRecord>,
    history: Vec<EnvelopeRecord>,
    fail_pushes: usize,
    fail_fetches: usize,
    latency: Option<Duration>,
    logged_in: bool,
    require_login: bool,
}

/// In-memory store.
///
/// Useful for testing and development. All data is stored in memory and
/// lost on drop. Clones share the same storage, so a test can keep a handle
/// while the sync layer owns another.
///
/// Besides storing the envelope it can inject failures, add latency to
/// every call, and records how many pushes overlapped in time.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a record.
    pub fn with_record(record: EnvelopeRecord) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                record: Some(record),
                ..State::default()
            })),
            ..Self::default()
        }
    }

    /// Make the next `n` pushes fail with `SyncFailed`.
    pub async fn fail_next_pushes(&self, n: usize) {
        self.state.write().await.fail_pushes = n;
    }

    /// Make the next `n` fetches fail with `SyncFailed`.
    pub async fn fail_next_fetches(&self, n: usize) {
        self.state.write().await.fail_fetches = n;
    }

    /// Delay every fetch and push by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = Some(latency);
    }

    /// Reject fetch and push until `login` has been called.
    pub async fn require_login(&self) {
        self.state.write().await.require_login = true;
    }

    /// Overwrite the stored record directly, bypassing push accounting.
    pub async fn put_raw(&self, record: EnvelopeRecord) {
        self.state.write().await.record = Some(record);
    }

    /// The currently stored record.
    pub async fn current(&self) -> Option<EnvelopeRecord> {
        self.state.read().await.record.clone()
    }

    /// Every record successfully pushed, oldest first.
    pub async fn history(&self) -> Vec<EnvelopeRecord> {
        self.state.read().await.history.clone()
    }

    /// Number of successful pushes.
    pub async fn push_count(&self) -> usize {
        self.state.read().await.history.len()
    }

    /// Highest number of pushes that were in progress at the same time.
    pub fn max_concurrent_pushes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = self.state.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_session(&self) -> Result<()> {
        let state = self.state.read().await;
        if state.require_login && !state.logged_in {
            return Err(Error::NotPermitted("No active session".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self) -> Result<Option<EnvelopeRecord>> {
        self.check_session().await?;
        self.delay().await;

        let mut state = self.state.write().await;
        if state.fail_fetches > 0 {
            state.fail_fetches -= 1;
            return Err(Error::SyncFailed("Injected fetch failure".to_string()));
        }
        Ok(state.record.clone().filter(EnvelopeRecord::has_data))
    }

    async fn push(&self, record: &EnvelopeRecord) -> Result<()> {
        self.check_session().await?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.delay().await;

        let result = {
            let mut state = self.state.write().await;
            if state.fail_pushes > 0 {
                state.fail_pushes -= 1;
                Err(Error::SyncFailed("Injected push failure".to_string()))
            } else {
                state.record = Some(record.clone());
                state.history.push(record.clone());
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl SessionGateway for MemoryStore {
    async fn login(&self, account_password: &str) -> Result<()> {
        if account_password.is_empty() {
            return Err(Error::NotPermitted("Login failed".to_string()));
        }
        self.state.write().await.logged_in = true;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.state.write().await.logged_in = false;
        Ok(())
    }
}
