//! libSQL snapshot store, backed by the `settings` table.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::onboarding::model::OnboardingData;
use crate::store::migrations;
use crate::store::traits::{SnapshotStore, settings_keys};

/// libSQL snapshot store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlSnapshotStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    user_id: String,
}

impl LibSqlSnapshotStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            user_id: settings_keys::DEFAULT_USER.to_string(),
        })
    }

    /// Scope the snapshot to a different user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[async_trait]
impl SnapshotStore for LibSqlSnapshotStore {
    async fn load(&self) -> Result<Option<OnboardingData>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![self.user_id.as_str(), settings_keys::ONBOARDING_DATA],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load snapshot: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("load snapshot: {e}"))),
        };

        let value: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("load snapshot: {e}")))?;

        match serde_json::from_str::<OnboardingData>(&value) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!(error = %e, "Stored onboarding snapshot is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    async fn save(&self, data: &OnboardingData) -> Result<(), DatabaseError> {
        let value = serde_json::to_string(data)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![
                    self.user_id.as_str(),
                    settings_keys::ONBOARDING_DATA,
                    value,
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save snapshot: {e}")))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![self.user_id.as_str(), settings_keys::ONBOARDING_DATA],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear snapshot: {e}")))?;
        Ok(())
    }
}
