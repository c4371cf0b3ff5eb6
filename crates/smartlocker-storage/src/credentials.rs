//! Credential store used by the kiosk.
//!
//! Combines the fingerprint mapping and administrator repositories behind one
//! cheap-to-clone handle. Argon2 work is pushed to the blocking pool so the
//! recognition path never stalls behind a login.

use crate::connection::Database;
use crate::error::{StorageError, StorageResult};
use crate::models::{FingerprintMapping, SlotIdentity};
use crate::password::{HashingConfig, SecretHasher};
use crate::repositories::{
    AdminRepository, FingerprintRepository, SqliteAdminRepository, SqliteFingerprintRepository,
};
use smartlocker_core::{
    Identity, SlotId,
    constants::{DEFAULT_ADMIN_IDENTITY, DEFAULT_ADMIN_SECRET},
};
use std::sync::Arc;
use subtle::Choice;
use tracing::{debug, info, warn};

/// Secret hashed once at startup so unknown identities cost a full
/// verification too.
const DUMMY_SECRET: &str = "smartlocker-timing-equalizer";

/// Persistent slot and administrator credentials.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    db: Database,
    fingerprints: SqliteFingerprintRepository,
    admins: SqliteAdminRepository,
    hasher: SecretHasher,
    dummy_hash: Arc<str>,
}

impl CredentialStore {
    /// Build a store on an open database.
    ///
    /// # Errors
    ///
    /// Fails if the hashing parameters are invalid.
    pub async fn new(db: Database, hashing: HashingConfig) -> StorageResult<Self> {
        let hasher = SecretHasher::new(hashing)?;
        let dummy_hash = {
            let hasher = hasher.clone();
            tokio::task::spawn_blocking(move || hasher.hash(DUMMY_SECRET)).await??
        };

        Ok(Self {
            fingerprints: SqliteFingerprintRepository::new(db.pool().clone()),
            admins: SqliteAdminRepository::new(db.pool().clone()),
            db,
            hasher,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn hash(&self, secret: &str) -> StorageResult<String> {
        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&secret)).await?
    }

    async fn verify(&self, secret: &str, phc: String) -> StorageResult<bool> {
        let hasher = self.hasher.clone();
        let secret = secret.to_owned();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&secret, &phc)).await?)
    }

    // ------------------------------------------------------------------------
    // Fingerprint mappings
    // ------------------------------------------------------------------------

    /// Who owns `slot`. A slot without a mapping is [`SlotIdentity::Unknown`].
    pub async fn get_identity_for_slot(&self, slot: SlotId) -> StorageResult<SlotIdentity> {
        Ok(match self.fingerprints.find_identity(slot).await? {
            Some(identity) => SlotIdentity::Enrolled(identity),
            None => SlotIdentity::Unknown,
        })
    }

    /// Map `slot` to `identity`, replacing any previous mapping atomically.
    pub async fn put_mapping(&self, slot: SlotId, identity: &Identity) -> StorageResult<()> {
        self.fingerprints.upsert(slot, identity.as_str()).await?;
        info!(%slot, %identity, "Fingerprint mapping stored");
        Ok(())
    }

    /// Remove the mapping for `slot`. Returns `false` if there was none.
    pub async fn delete_mapping(&self, slot: SlotId) -> StorageResult<bool> {
        let deleted = self.fingerprints.delete(slot).await?;
        if deleted {
            info!(%slot, "Fingerprint mapping deleted");
        }
        Ok(deleted)
    }

    pub async fn list_mappings(&self) -> StorageResult<Vec<FingerprintMapping>> {
        self.fingerprints.find_all().await
    }

    // ------------------------------------------------------------------------
    // Administrators
    // ------------------------------------------------------------------------

    /// Check an administrator secret.
    ///
    /// Unknown identities run a full verification against a dummy hash and
    /// the result is combined in constant time, so the answer takes about as
    /// long whether or not the identity exists.
    pub async fn verify_admin(&self, identity: &str, secret: &str) -> StorageResult<bool> {
        let record = self.admins.find_by_identity(identity.trim()).await?;

        let (phc, known) = match record {
            Some(record) => (record.secret_hash, Choice::from(1)),
            None => (self.dummy_hash.to_string(), Choice::from(0)),
        };

        let matched = Choice::from(u8::from(self.verify(secret, phc).await?));
        let granted = bool::from(matched & known);
        debug!(granted, "Administrator verification");
        Ok(granted)
    }

    /// Rehash and overwrite the secret of an existing administrator.
    ///
    /// # Errors
    ///
    /// `StorageError::Validation` for an empty secret, `StorageError::NotFound`
    /// for an unknown identity.
    pub async fn set_admin_secret(&self, identity: &str, new_secret: &str) -> StorageResult<()> {
        if new_secret.is_empty() {
            return Err(StorageError::Validation("Secret must not be empty".into()));
        }

        let hash = self.hash(new_secret).await?;
        self.admins.update_secret_hash(identity.trim(), &hash).await?;
        info!(identity = identity.trim(), "Administrator secret changed");
        Ok(())
    }

    /// Create the first-run administrator when no administrator exists.
    ///
    /// Returns `true` if the default account was created.
    pub async fn ensure_default_admin(&self) -> StorageResult<bool> {
        if self.admins.count().await? > 0 {
            return Ok(false);
        }

        let hash = self.hash(DEFAULT_ADMIN_SECRET).await?;
        let created = self
            .admins
            .create_if_absent(DEFAULT_ADMIN_IDENTITY, &hash)
            .await?;
        if created {
            warn!(
                identity = DEFAULT_ADMIN_IDENTITY,
                "Created default administrator; change its secret before deployment"
            );
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> CredentialStore {
        let db = Database::in_memory().await.unwrap();
        CredentialStore::new(db, HashingConfig::new(1024, 1, 1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_slot_is_not_an_error() {
        let store = store().await;
        assert_eq!(
            store.get_identity_for_slot(SlotId::new(42)).await.unwrap(),
            SlotIdentity::Unknown
        );
    }

    #[tokio::test]
    async fn test_put_mapping_last_writer_wins() {
        let store = store().await;
        let slot = SlotId::new(5);

        store.put_mapping(slot, &Identity::new("Ana").unwrap()).await.unwrap();
        store.put_mapping(slot, &Identity::new("Beto").unwrap()).await.unwrap();

        assert_eq!(
            store.get_identity_for_slot(slot).await.unwrap(),
            SlotIdentity::Enrolled("Beto".into())
        );
    }

    #[tokio::test]
    async fn test_delete_and_list_mappings() {
        let store = store().await;
        store
            .put_mapping(SlotId::new(1), &Identity::new("Ana").unwrap())
            .await
            .unwrap();
        store
            .put_mapping(SlotId::new(2), &Identity::new("Beto").unwrap())
            .await
            .unwrap();

        assert!(store.delete_mapping(SlotId::new(1)).await.unwrap());
        let remaining = store.list_mappings().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].identity, "Beto");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_verifies() {
        let store = store().await;

        assert!(store.ensure_default_admin().await.unwrap());
        assert!(!store.ensure_default_admin().await.unwrap());

        assert!(store.verify_admin("admin", "admin123").await.unwrap());
        assert!(!store.verify_admin("admin", "wrong").await.unwrap());
        assert!(!store.verify_admin("nouser", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_admin_secret() {
        let store = store().await;
        store.ensure_default_admin().await.unwrap();

        store.set_admin_secret("admin", "n3w-secret").await.unwrap();
        assert!(!store.verify_admin("admin", "admin123").await.unwrap());
        assert!(store.verify_admin("admin", "n3w-secret").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_admin_secret_rejects_empty() {
        let store = store().await;
        store.ensure_default_admin().await.unwrap();

        let result = store.set_admin_secret("admin", "").await;
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_admin_secret_unknown_identity() {
        let store = store().await;
        let result = store.set_admin_secret("ghost", "pw").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }
}
