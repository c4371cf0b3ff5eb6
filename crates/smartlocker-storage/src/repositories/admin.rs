#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::AdminRecord;
use sqlx::SqlitePool;

/// Repository trait for administrator credentials
pub trait AdminRepository: Send + Sync {
    /// Find an administrator by identity
    async fn find_by_identity(&self, identity: &str) -> StorageResult<Option<AdminRecord>>;

    /// Insert an administrator unless the identity already exists.
    /// Returns `true` if a row was inserted.
    async fn create_if_absent(&self, identity: &str, secret_hash: &str) -> StorageResult<bool>;

    /// Replace the stored hash for an existing administrator
    async fn update_secret_hash(&self, identity: &str, secret_hash: &str) -> StorageResult<()>;

    /// Number of administrators
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of AdminRepository
#[derive(Debug, Clone)]
pub struct SqliteAdminRepository {
    pool: SqlitePool,
}

impl SqliteAdminRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AdminRepository for SqliteAdminRepository {
    async fn find_by_identity(&self, identity: &str) -> StorageResult<Option<AdminRecord>> {
        let admin = sqlx::query_as::<_, AdminRecord>(
            r#"
            SELECT id, identity, secret_hash, created_at, updated_at
            FROM admins
            WHERE identity = ?
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(admin)
    }

    async fn create_if_absent(&self, identity: &str, secret_hash: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO admins (identity, secret_hash)
            VALUES (?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(identity)
        .bind(secret_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_secret_hash(&self, identity: &str, secret_hash: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE admins
            SET secret_hash = ?, updated_at = datetime('now')
            WHERE identity = ?
            "#,
        )
        .bind(secret_hash)
        .bind(identity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Admin", "identity", identity));
        }

        Ok(())
    }

    async fn count(&self) -> StorageResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    const HASH_A: &str = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2g";
    const HASH_B: &str = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$b3RoZXJoYXNo";

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = setup_test_db().await;
        let repo = SqliteAdminRepository::new(db.pool().clone());

        assert!(repo.create_if_absent("admin", HASH_A).await.unwrap());

        let found = repo.find_by_identity("admin").await.unwrap().unwrap();
        assert_eq!(found.identity, "admin");
        assert_eq!(found.secret_hash, HASH_A);
        assert!(repo.find_by_identity("root").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_existing() {
        let db = setup_test_db().await;
        let repo = SqliteAdminRepository::new(db.pool().clone());

        assert!(repo.create_if_absent("admin", HASH_A).await.unwrap());
        assert!(!repo.create_if_absent("admin", HASH_B).await.unwrap());

        let found = repo.find_by_identity("admin").await.unwrap().unwrap();
        assert_eq!(found.secret_hash, HASH_A);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_secret_hash() {
        let db = setup_test_db().await;
        let repo = SqliteAdminRepository::new(db.pool().clone());

        repo.create_if_absent("admin", HASH_A).await.unwrap();
        repo.update_secret_hash("admin", HASH_B).await.unwrap();

        let found = repo.find_by_identity("admin").await.unwrap().unwrap();
        assert_eq!(found.secret_hash, HASH_B);
    }

    #[tokio::test]
    async fn test_update_unknown_admin() {
        let db = setup_test_db().await;
        let repo = SqliteAdminRepository::new(db.pool().clone());

        let result = repo.update_secret_hash("ghost", HASH_A).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_schema_rejects_non_phc_hash() {
        let db = setup_test_db().await;
        let repo = SqliteAdminRepository::new(db.pool().clone());

        let result = repo.create_if_absent("admin", "plaintext").await;
        assert!(matches!(result, Err(StorageError::Database(_))));
    }
}
