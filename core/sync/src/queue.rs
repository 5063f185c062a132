//! Save queue: the single consumer of "collection changed" notifications.
//!
//! The UI side sends commands through a [`SaveQueueHandle`]; one background
//! task drains them and calls [`SyncController::save`]. When several changes
//! pile up while a save is running, only the newest collection is written.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sealcal_common::{Error, EventCollection, Result};
use sealcal_storage::EventStore;

use crate::config::SyncConfig;
use crate::controller::SyncController;
use crate::retry::RetryExecutor;

/// Commands accepted by the save queue.
#[derive(Debug)]
pub enum SaveCommand {
    /// The collection was mutated; persist this snapshot.
    CollectionChanged(EventCollection),
    /// Reply once every earlier change has been saved.
    Flush(oneshot::Sender<SaveStatus>),
    /// Save anything pending, then stop.
    Shutdown,
}

/// Outcome of the most recent save, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Nothing has been saved yet.
    Idle,
    /// A save is running.
    Saving,
    /// The last save reached the store.
    Saved,
    /// The last save failed; carries the user-facing message.
    Failed(String),
}

/// Background consumer of [`SaveCommand`]s.
pub struct SaveQueue<S: EventStore + ?Sized = dyn EventStore> {
    controller: Arc<SyncController<S>>,
    retry: RetryExecutor,
    commands: mpsc::Receiver<SaveCommand>,
    status: watch::Sender<SaveStatus>,
}

/// Commands drained from the channel in one go.
#[derive(Default)]
struct Batch {
    latest: Option<EventCollection>,
    changes: usize,
    waiters: Vec<oneshot::Sender<SaveStatus>>,
    shutdown: bool,
}

impl Batch {
    fn absorb(&mut self, command: SaveCommand) {
        match command {
            SaveCommand::CollectionChanged(events) => {
                self.latest = Some(events);
                self.changes += 1;
            }
            SaveCommand::Flush(reply) => self.waiters.push(reply),
            SaveCommand::Shutdown => self.shutdown = true,
        }
    }
}

impl<S: EventStore + ?Sized + 'static> SaveQueue<S> {
    /// Start the consumer task.
    ///
    /// The task runs until [`SaveQueueHandle::shutdown`] is called or every
    /// handle is dropped.
    pub fn spawn(
        controller: Arc<SyncController<S>>,
        config: &SyncConfig,
    ) -> (SaveQueueHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);

        let queue = Self {
            controller,
            retry: RetryExecutor::new(config.retry.clone()),
            commands: rx,
            status: status_tx,
        };
        let task = tokio::spawn(queue.run());

        let handle = SaveQueueHandle {
            commands: tx,
            status: status_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!("Save queue started");

        while let Some(command) = self.commands.recv().await {
            let mut batch = Batch::default();
            batch.absorb(command);
            while !batch.shutdown {
                match self.commands.try_recv() {
                    Ok(command) => batch.absorb(command),
                    Err(_) => break,
                }
            }

            if let Some(events) = batch.latest.take() {
                if batch.changes > 1 {
                    debug!("Coalesced {} pending changes into one save", batch.changes);
                }
                self.save(events).await;
            }

            let outcome = self.status.borrow().clone();
            for waiter in batch.waiters {
                let _ = waiter.send(outcome.clone());
            }

            if batch.shutdown {
                break;
            }
        }

        info!("Save queue stopped");
    }

    async fn save(&self, events: EventCollection) {
        self.status.send_replace(SaveStatus::Saving);

        let controller = &self.controller;
        let events = &events;
        let result = self
            .retry
            .execute(|| async move { controller.save(events).await })
            .await;

        let status = match result {
            Ok(()) => SaveStatus::Saved,
            Err(e) => {
                warn!("Save failed: {}", e);
                SaveStatus::Failed(e.user_message().to_string())
            }
        };
        self.status.send_replace(status);
    }
}

/// Cloneable sender side of the save queue.
#[derive(Clone)]
pub struct SaveQueueHandle {
    commands: mpsc::Sender<SaveCommand>,
    status: watch::Receiver<SaveStatus>,
}

impl SaveQueueHandle {
    /// Notify the queue that the collection changed.
    ///
    /// Waits for room in the queue when it is full.
    pub async fn collection_changed(&self, events: EventCollection) -> Result<()> {
        self.send(SaveCommand::CollectionChanged(events)).await
    }

    /// Wait until every change sent before this call has been saved.
    ///
    /// # Returns
    /// - The status of the last save attempt
    pub async fn flush(&self) -> Result<SaveStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SaveCommand::Flush(reply_tx)).await?;
        reply_rx.await.map_err(|_| stopped())
    }

    /// Save anything pending and stop the consumer task.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SaveCommand::Shutdown).await
    }

    /// Status of the most recent save.
    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    async fn send(&self, command: SaveCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::NotPermitted("Save queue is not running".to_string())
}
