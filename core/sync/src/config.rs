//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryConfig;
use sealcal_common::{Error, Result};

/// Default calendar server.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000/";

/// Configuration for the sync layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the calendar server.
    pub server_url: String,
    /// Timeout applied to every request to the server.
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    /// Retry policy for failed saves.
    pub retry: RetryConfig,
    /// Maximum number of commands waiting for the save queue.
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            queue_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    ///
    /// Missing keys take their default value.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Check the values that would make the sync layer unusable.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidInput(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
