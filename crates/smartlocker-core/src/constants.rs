//! Core constants for the SmartLocker kiosk.
//!
//! This module centralizes the slot layout of the fingerprint sensor, the
//! timing defaults of the polling and actuation paths, and the first-run
//! administrator credential. Configuration structs in the other crates use
//! these values for their `Default` implementations.
//!
//! # Usage
//!
//! ```
//! use smartlocker_core::constants::*;
//! use std::time::Duration;
//!
//! let debounce = Duration::from_millis(DEFAULT_MATCH_DEBOUNCE_MS);
//! assert!(debounce > Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
//!
//! // Valid enrollment slots
//! assert!((FIRST_SLOT_ID..DEFAULT_SENSOR_CAPACITY).contains(&1));
//! ```

// ============================================================================
// Sensor Slot Layout
// ============================================================================

/// Lowest slot id used for enrollment.
///
/// Slot 0 is left untouched; the free-slot scan starts here and walks upward.
pub const FIRST_SLOT_ID: u16 = 1;

/// Template capacity assumed when the device does not report one.
///
/// R307/AS608 class sensors ship with room for at least 128 templates.
pub const DEFAULT_SENSOR_CAPACITY: u16 = 128;

// ============================================================================
// Identities
// ============================================================================

/// Maximum length of an enrolled identity (characters).
pub const MAX_IDENTITY_LENGTH: usize = 100;

/// Display name used when a matched slot has no mapping in the store.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Administrator created on first run when the credential store is empty.
pub const DEFAULT_ADMIN_IDENTITY: &str = "admin";

/// Secret of the first-run administrator. Operators are expected to change it.
pub const DEFAULT_ADMIN_SECRET: &str = "admin123";

// ============================================================================
// Recognition Polling (milliseconds)
// ============================================================================

/// Sleep between two empty capture attempts.
///
/// "No finger" is by far the most common poll outcome, so this keeps the loop
/// cheap without making the sensor feel sluggish.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Pause after a granted match before polling resumes.
pub const DEFAULT_MATCH_DEBOUNCE_MS: u64 = 3000;

/// Backoff applied after a transient device fault.
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Enrollment (milliseconds)
// ============================================================================

/// Overall budget for one enrollment, from slot lookup to commit.
pub const DEFAULT_ENROLLMENT_TIMEOUT_MS: u64 = 30_000;

/// Interval between capture attempts while waiting for a finger or removal.
pub const DEFAULT_ENROLLMENT_POLL_MS: u64 = 100;

/// Pause after the first capture before checking that the finger was lifted.
pub const DEFAULT_REMOVAL_SETTLE_MS: u64 = 1000;

// ============================================================================
// Actuation (milliseconds)
// ============================================================================

/// How long the solenoid stays energized per activation.
pub const DEFAULT_HOLD_MS: u64 = 2000;

/// Window after an activation during which further requests are coalesced.
///
/// Never shorter than [`DEFAULT_HOLD_MS`].
pub const DEFAULT_COOLDOWN_MS: u64 = 3000;

/// BCM pin driving the solenoid relay on the reference kiosk.
pub const DEFAULT_SOLENOID_PIN: u32 = 17;

const _: () = assert!(DEFAULT_COOLDOWN_MS >= DEFAULT_HOLD_MS);
const _: () = assert!(FIRST_SLOT_ID < DEFAULT_SENSOR_CAPACITY);
