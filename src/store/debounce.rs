//! Debounced snapshot writer.
//!
//! Callers schedule snapshots without waiting. A background task keeps only
//! the most recent one and writes it once the window passes with no newer
//! snapshot arriving.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::onboarding::model::OnboardingData;
use crate::store::traits::SnapshotStore;

enum Command {
    Save(Box<OnboardingData>),
    Flush(oneshot::Sender<()>),
    Clear(oneshot::Sender<Result<(), DatabaseError>>),
}

/// Handle to the background writer. Cloning shares the same task.
#[derive(Clone)]
pub struct DebouncedSaver {
    store: Arc<dyn SnapshotStore>,
    tx: mpsc::UnboundedSender<Command>,
}

impl DebouncedSaver {
    /// Spawn the writer task on the current runtime.
    pub fn spawn(store: Arc<dyn SnapshotStore>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store.clone(), window, rx));
        Self { store, tx }
    }

    /// The underlying store, for direct reads.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Queue a snapshot. Restarts the debounce window.
    pub fn schedule(&self, data: &OnboardingData) {
        if self.tx.send(Command::Save(Box::new(data.clone()))).is_err() {
            warn!("Snapshot writer has stopped, dropping save");
        }
    }

    /// Write any pending snapshot now.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Drop any pending snapshot and clear the store.
    pub async fn clear(&self) -> Result<(), DatabaseError> {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Clear(ack)).is_err() {
            return self.store.clear().await;
        }
        match done.await {
            Ok(result) => result,
            Err(_) => self.store.clear().await,
        }
    }
}

async fn write(store: &Arc<dyn SnapshotStore>, data: &OnboardingData) {
    match store.save(data).await {
        Ok(()) => debug!(
            answers = data.answers.len(),
            progress = data.progress_percent,
            "Snapshot saved"
        ),
        Err(e) => warn!(error = %e, "Failed to save onboarding snapshot"),
    }
}

async fn run(
    store: Arc<dyn SnapshotStore>,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<Box<OnboardingData>> = None;

    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    if let Some(data) = pending.take() {
                        write(&store, &data).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Save(data)) => pending = Some(data),
            Some(Command::Flush(ack)) => {
                if let Some(data) = pending.take() {
                    write(&store, &data).await;
                }
                let _ = ack.send(());
            }
            Some(Command::Clear(ack)) => {
                pending = None;
                let _ = ack.send(store.clear().await);
            }
            None => {
                // All handles dropped
                if let Some(data) = pending.take() {
                    write(&store, &data).await;
                }
                break;
            }
        }
    }
}
