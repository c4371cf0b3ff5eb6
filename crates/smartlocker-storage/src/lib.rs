//! Credential persistence for the SmartLocker kiosk.
//!
//! SQLite-backed storage for two kinds of records:
//!
//! - fingerprint mappings, from a sensor template slot to the enrolled
//!   person's name;
//! - administrator credentials, stored as Argon2id hashes.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool manager with automatic migrations
//! - [`FingerprintRepository`], [`AdminRepository`] - Data access traits
//! - [`CredentialStore`] - The facade used by the kiosk
//!
//! # Example
//!
//! ```no_run
//! use smartlocker_core::{Identity, SlotId};
//! use smartlocker_storage::{CredentialStore, Database, DatabaseConfig, HashingConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("smartlocker.db")).await?;
//! let store = CredentialStore::new(db, HashingConfig::default()).await?;
//! store.ensure_default_admin().await?;
//!
//! store.put_mapping(SlotId::new(1), &Identity::new("Ana")?).await?;
//! let who = store.get_identity_for_slot(SlotId::new(1)).await?;
//! println!("Slot 1 belongs to {}", who.display_name());
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The pool runs SQLite in WAL mode. Mapping writes are single upsert
//! statements, so a concurrent reader sees either the previous or the new
//! identity for a slot, never anything in between.

pub mod connection;
pub mod credentials;
pub mod error;
pub mod models;
pub mod password;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use credentials::CredentialStore;
pub use error::{StorageError, StorageResult};
pub use models::{AdminRecord, FingerprintMapping, SlotIdentity};
pub use password::{HashingConfig, SecretHasher};
pub use repositories::{
    AdminRepository, FingerprintRepository, SqliteAdminRepository, SqliteFingerprintRepository,
};
