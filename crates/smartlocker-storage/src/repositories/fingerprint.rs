#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::FingerprintMapping;
use chrono::{DateTime, Utc};
use smartlocker_core::SlotId;
use sqlx::SqlitePool;

/// Repository trait for fingerprint slot mappings
pub trait FingerprintRepository: Send + Sync {
    /// Identity stored for a slot, if any
    async fn find_identity(&self, slot: SlotId) -> StorageResult<Option<String>>;

    /// Insert or overwrite the mapping for a slot in a single statement
    async fn upsert(&self, slot: SlotId, identity: &str) -> StorageResult<()>;

    /// Delete the mapping for a slot. Returns `false` if there was none.
    async fn delete(&self, slot: SlotId) -> StorageResult<bool>;

    /// All mappings ordered by slot
    async fn find_all(&self) -> StorageResult<Vec<FingerprintMapping>>;
}

/// SQLite implementation of FingerprintRepository
#[derive(Debug, Clone)]
pub struct SqliteFingerprintRepository {
    pool: SqlitePool,
}

impl SqliteFingerprintRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

type MappingRow = (i64, String, DateTime<Utc>, DateTime<Utc>);

fn into_mapping((slot, identity, created_at, updated_at): MappingRow) -> StorageResult<FingerprintMapping> {
    let slot = u16::try_from(slot)
        .map_err(|_| StorageError::Validation(format!("Stored slot {slot} is out of range")))?;
    Ok(FingerprintMapping {
        slot: SlotId::new(slot),
        identity,
        created_at,
        updated_at,
    })
}

impl FingerprintRepository for SqliteFingerprintRepository {
    async fn find_identity(&self, slot: SlotId) -> StorageResult<Option<String>> {
        let identity: Option<(String,)> =
            sqlx::query_as("SELECT identity FROM fingerprints WHERE slot_id = ?")
                .bind(i64::from(slot.as_u16()))
                .fetch_optional(&self.pool)
                .await?;

        Ok(identity.map(|(identity,)| identity))
    }

    async fn upsert(&self, slot: SlotId, identity: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fingerprints (slot_id, identity)
            VALUES (?, ?)
            ON CONFLICT(slot_id) DO UPDATE
            SET identity = excluded.identity,
                updated_at = datetime('now')
            "#,
        )
        .bind(i64::from(slot.as_u16()))
        .bind(identity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, slot: SlotId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM fingerprints WHERE slot_id = ?")
            .bind(i64::from(slot.as_u16()))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_all(&self) -> StorageResult<Vec<FingerprintMapping>> {
        let rows: Vec<MappingRow> = sqlx::query_as(
            r#"
            SELECT slot_id, identity, created_at, updated_at
            FROM fingerprints
            ORDER BY slot_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_mapping).collect()
    }
}
