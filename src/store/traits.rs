//! `SnapshotStore` trait: the single persisted onboarding record.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::OnboardingData;

/// Settings-table keys owned by the onboarding session.
pub mod settings_keys {
    pub const ONBOARDING_DATA: &str = "onboarding_data";
    pub const DEFAULT_USER: &str = "default";
}

/// Persistence for the session snapshot. Each `save` writes the whole
/// snapshot as one JSON blob.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot, if any.
    async fn load(&self) -> Result<Option<OnboardingData>, DatabaseError>;

    /// Replace the stored snapshot.
    async fn save(&self, data: &OnboardingData) -> Result<(), DatabaseError>;

    /// Remove the stored snapshot. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), DatabaseError>;
}
