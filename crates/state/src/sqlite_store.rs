use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tigerhost_addons_types::{
    Addon, AddonConfig, AddonEvent, AddonState, AppRef, StateTransition, UserRef,
};
use uuid::Uuid;

use crate::store::AddonStore;
use crate::StoreError;

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database at `url` (e.g. `sqlite://addons.db`), creating
    /// the file if needed, and run migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    ///
    /// Every connection to `sqlite::memory:` gets its own database, so the
    /// pool is limited to a single connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(include_str!("../migrations/001_create_addons.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        sqlx::query(include_str!("../migrations/002_create_transitions.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tracing::debug!("Addon store migrations applied");
        Ok(())
    }

    /// Convert database row to Addon
    fn row_to_addon(row: &SqliteRow) -> Result<Addon, StoreError> {
        let state = parse_state(row.get("state"))?;

        let provider_uuid = row
            .get::<Option<String>, _>("provider_uuid")
            .map(|raw| {
                Uuid::parse_str(&raw).map_err(|e| StoreError::SerializationError(e.to_string()))
            })
            .transpose()?;

        let config = row
            .get::<Option<String>, _>("config")
            .map(|raw| {
                serde_json::from_str::<AddonConfig>(&raw)
                    .map_err(|e| StoreError::SerializationError(e.to_string()))
            })
            .transpose()?;

        let app = match (
            row.get::<Option<String>, _>("app_id"),
            row.get::<Option<String>, _>("app_backend"),
        ) {
            (Some(app_id), Some(backend)) => Some(AppRef { app_id, backend }),
            _ => None,
        };

        Ok(Addon {
            id: row.get("id"),
            provider_name: row.get("provider_name"),
            provider_uuid,
            state,
            config,
            config_customization: row.get("config_customization"),
            app,
            user: row
                .get::<Option<String>, _>("username")
                .map(|username| UserRef { username }),
            message: row.get("message"),
            created_at: row.get::<i64, _>("created_at") as u64,
            updated_at: row.get::<i64, _>("updated_at") as u64,
        })
    }
}

#[async_trait]
impl AddonStore for SqliteStore {
    async fn create(&self, addon: &Addon) -> Result<(), StoreError> {
        let config = encode_config(addon)?;

        let result = sqlx::query(
            r#"
            INSERT INTO addons (
                id, provider_name, provider_uuid, state, config, config_customization,
                app_id, app_backend, username, message, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&addon.id)
        .bind(&addon.provider_name)
        .bind(addon.provider_uuid.map(|u| u.to_string()))
        .bind(addon.state.as_str())
        .bind(&config)
        .bind(&addon.config_customization)
        .bind(addon.app.as_ref().map(|a| a.app_id.as_str()))
        .bind(addon.app.as_ref().map(|a| a.backend.as_str()))
        .bind(addon.user.as_ref().map(|u| u.username.as_str()))
        .bind(&addon.message)
        .bind(addon.created_at as i64)
        .bind(addon.updated_at as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateId(addon.id.clone()))
            }
            Err(e) => Err(StoreError::DatabaseError(e.to_string())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Addon>, StoreError> {
        let row = sqlx::query("SELECT * FROM addons WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_addon(&row)?)),
            None => Ok(None),
        }
    }

    async fn commit_transition(
        &self,
        addon: &Addon,
        expected: AddonState,
        transition: StateTransition,
    ) -> Result<(), StoreError> {
        let config = encode_config(addon)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE addons
            SET provider_uuid = ?, state = ?, config = ?, app_id = ?, app_backend = ?,
                username = ?, message = ?, updated_at = ?
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(addon.provider_uuid.map(|u| u.to_string()))
        .bind(addon.state.as_str())
        .bind(&config)
        .bind(addon.app.as_ref().map(|a| a.app_id.as_str()))
        .bind(addon.app.as_ref().map(|a| a.backend.as_str()))
        .bind(addon.user.as_ref().map(|u| u.username.as_str()))
        .bind(&addon.message)
        .bind(addon.updated_at as i64)
        .bind(&addon.id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM addons WHERE id = ?")
                .bind(&addon.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::DatabaseError(e.to_string()))?
                .is_some();

            // Dropping the transaction rolls it back
            return Err(if exists {
                StoreError::Conflict {
                    id: addon.id.clone(),
                    expected,
                }
            } else {
                StoreError::NotFound(addon.id.clone())
            });
        }

        sqlx::query(
            r#"
            INSERT INTO addon_transitions (
                addon_id, event, from_state, to_state, timestamp, details
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&addon.id)
        .bind(transition.event.as_str())
        .bind(transition.from_state.as_str())
        .bind(transition.to_state.as_str())
        .bind(transition.timestamp as i64)
        .bind(&transition.details)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn list_by_state(
        &self,
        state: AddonState,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Addon>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM addons WHERE state = ? ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(state.as_str())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_addon).collect()
    }

    async fn history(&self, id: &str) -> Result<Vec<StateTransition>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM addon_transitions WHERE addon_id = ? ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(StateTransition {
                    event: parse_event(row.get("event"))?,
                    from_state: parse_state(row.get("from_state"))?,
                    to_state: parse_state(row.get("to_state"))?,
                    timestamp: row.get::<i64, _>("timestamp") as u64,
                    details: row.get("details"),
                })
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn encode_config(addon: &Addon) -> Result<Option<String>, StoreError> {
    addon
        .config
        .as_ref()
        .map(|config| {
            serde_json::to_string(config).map_err(|e| StoreError::SerializationError(e.to_string()))
        })
        .transpose()
}

fn parse_state(s: &str) -> Result<AddonState, StoreError> {
    AddonState::from_str(s).map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn parse_event(s: &str) -> Result<AddonEvent, StoreError> {
    AddonEvent::from_str(s).map_err(|e| StoreError::SerializationError(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
