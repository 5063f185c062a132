//! Local filesystem store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::provider::EventStore;
use sealcal_common::{EnvelopeRecord, Error, Result};

/// Local filesystem store.
///
/// Keeps the envelope record as a single JSON file. Writes go to a sibling
/// temporary file that is then renamed over the target, so a crash never
/// leaves a half-written envelope behind.
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Create a new local store backed by the file at `path`.
    ///
    /// # Postconditions
    /// - The parent directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl EventStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self) -> Result<Option<EnvelopeRecord>> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No envelope at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let record = EnvelopeRecord::from_json(&json)?;
        Ok(record.has_data().then_some(record))
    }

    async fn push(&self, record: &EnvelopeRecord) -> Result<()> {
        let json = record.to_json()?;
        let temp = self.temp_path();

        fs::write(&temp, json.as_bytes()).await?;
        fs::rename(&temp, &self.path).await?;

        debug!("Wrote envelope to {}", self.path.display());
        Ok(())
    }
}
