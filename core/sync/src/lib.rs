//! sealcal sync layer
//!
//! This module keeps the encrypted calendar in step with its store:
//! - Session state machine owning the encryption password
//! - Load and save through the encrypted envelope
//! - A save queue that serializes and coalesces writes
//! - Retry strategy with exponential backoff
//! - Configuration

pub mod config;
pub mod controller;
pub mod queue;
pub mod retry;
pub mod state;

// Re-export main types
pub use config::SyncConfig;
pub use controller::SyncController;
pub use queue::{SaveCommand, SaveQueue, SaveQueueHandle, SaveStatus};
pub use retry::{RetryConfig, RetryExecutor};
pub use state::SessionState;
