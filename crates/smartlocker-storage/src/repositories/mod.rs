pub mod admin;
pub mod fingerprint;

pub use admin::{AdminRepository, SqliteAdminRepository};
pub use fingerprint::{FingerprintRepository, SqliteFingerprintRepository};
