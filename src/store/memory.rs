//! In-memory snapshot store, for tests and database-less runs.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::onboarding::model::OnboardingData;
use crate::store::traits::SnapshotStore;

#[derive(Default)]
pub struct MemorySnapshotStore {
    data: RwLock<Option<OnboardingData>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a snapshot already stored.
    pub fn with_snapshot(data: OnboardingData) -> Self {
        Self {
            data: RwLock::new(Some(data)),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<OnboardingData>, DatabaseError> {
        Ok(self.data.read().await.clone())
    }

    async fn save(&self, data: &OnboardingData) -> Result<(), DatabaseError> {
        *self.data.write().await = Some(data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), DatabaseError> {
        *self.data.write().await = None;
        Ok(())
    }
}
