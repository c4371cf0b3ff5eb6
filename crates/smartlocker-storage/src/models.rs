//! Persisted credential records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartlocker_core::{SlotId, constants::UNKNOWN_IDENTITY};

/// Sensor slot to identity mapping.
///
/// Maps to the `fingerprints` table. `slot` is the template slot on the
/// sensor; `identity` is the trimmed, non-empty name given at enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintMapping {
    pub slot: SlotId,
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrator credential.
///
/// `secret_hash` is an Argon2 PHC string and never leaves the storage crate
/// except for verification.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminRecord {
    pub id: i64,
    pub identity: String,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of looking up who owns a matched slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotIdentity {
    Enrolled(String),
    /// The sensor knows the finger but the store has no name for it.
    Unknown,
}

impl SlotIdentity {
    /// Name to show and log for this slot.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Enrolled(identity) => identity,
            Self::Unknown => UNKNOWN_IDENTITY,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Enrolled(_))
    }
}
