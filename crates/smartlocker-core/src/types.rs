use crate::{
    Result,
    constants::{FIRST_SLOT_ID, MAX_IDENTITY_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Template slot on the fingerprint sensor.
///
/// Slot ids are assigned by the device and bounded by its template capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u16);

impl SlotId {
    pub const fn new(id: u16) -> Self {
        SlotId(id)
    }

    /// Get the raw slot number.
    #[must_use]
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Check whether the slot can be used for enrollment on a device with
    /// the given capacity.
    #[must_use]
    pub fn fits(&self, capacity: u16) -> bool {
        self.0 >= FIRST_SLOT_ID && self.0 < capacity
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SlotId {
    fn from(id: u16) -> Self {
        SlotId(id)
    }
}

impl std::str::FromStr for SlotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u16>()
            .map(SlotId)
            .map_err(|_| Error::InvalidSlot(s.to_string()))
    }
}

/// Name of an enrolled person or administrator.
///
/// Identities are trimmed and must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a new identity with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidIdentity` if the trimmed value is empty or longer
    /// than [`MAX_IDENTITY_LENGTH`] characters.
    pub fn new(value: &str) -> Result<Self> {
        let value = value.trim();

        if value.is_empty() {
            return Err(Error::InvalidIdentity("identity must not be empty".into()));
        }

        if value.chars().count() > MAX_IDENTITY_LENGTH {
            return Err(Error::InvalidIdentity(format!(
                "identity must be at most {MAX_IDENTITY_LENGTH} characters"
            )));
        }

        Ok(Identity(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Identity::new(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// Where an activation request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSource {
    /// Local fingerprint sensor match.
    Fingerprint,

    /// Remote face recognition verdict.
    Face,

    /// Administrator override from the kiosk.
    Manual,
}

impl fmt::Display for AccessSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fingerprint => write!(f, "Fingerprint"),
            Self::Face => write!(f, "Face"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

/// A grant produced by one of the access paths.
///
/// Access events are transient: they are handed to the actuator arbiter and
/// reported to the presentation layer, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub source: AccessSource,
    pub identity: String,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    pub fn new(source: AccessSource, identity: impl Into<String>) -> Self {
        Self {
            source,
            identity: identity.into(),
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Which of the two enrollment captures is being fed to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureStage {
    First,
    Second,
}

impl CaptureStage {
    /// Sensor character buffer that receives the template for this stage.
    pub fn buffer_index(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Physical lock position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPosition {
    #[default]
    Locked,
    Unlocked,
}

/// In-memory view of the lock, owned and mutated by the actuator arbiter only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub position: LockPosition,
    pub last_activated_at: Option<DateTime<Utc>>,
}

impl ActuatorState {
    pub fn is_unlocked(&self) -> bool {
        self.position == LockPosition::Unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Maria", "Maria")]
    #[case("  Joao Silva ", "Joao Silva")]
    fn test_identity_is_trimmed(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Identity::new(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_identity_rejects_blank(#[case] input: &str) {
        assert!(matches!(
            Identity::new(input),
            Err(Error::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_identity_rejects_overlong() {
        let name = "x".repeat(MAX_IDENTITY_LENGTH + 1);
        assert!(Identity::new(&name).is_err());
    }

    #[test]
    fn test_identity_deserialization_validates() {
        let ok: Identity = serde_json::from_str("\"Ana\"").unwrap();
        assert_eq!(ok.as_str(), "Ana");
        assert!(serde_json::from_str::<Identity>("\"  \"").is_err());
    }

    #[rstest]
    #[case(0, 128, false)]
    #[case(1, 128, true)]
    #[case(127, 128, true)]
    #[case(128, 128, false)]
    fn test_slot_fits_capacity(#[case] slot: u16, #[case] capacity: u16, #[case] fits: bool) {
        assert_eq!(SlotId::new(slot).fits(capacity), fits);
    }

    #[test]
    fn test_slot_parse() {
        assert_eq!("42".parse::<SlotId>().unwrap(), SlotId::new(42));
        assert!("abc".parse::<SlotId>().is_err());
    }

    #[test]
    fn test_capture_stage_buffers() {
        assert_eq!(CaptureStage::First.buffer_index(), 1);
        assert_eq!(CaptureStage::Second.buffer_index(), 2);
    }

    #[test]
    fn test_access_event_builder() {
        let event = AccessEvent::new(AccessSource::Face, "Ana").with_confidence(87.5);
        assert_eq!(event.source, AccessSource::Face);
        assert_eq!(event.identity, "Ana");
        assert_eq!(event.confidence, Some(87.5));
    }

    #[test]
    fn test_actuator_state_default_locked() {
        let state = ActuatorState::default();
        assert_eq!(state.position, LockPosition::Locked);
        assert!(state.last_activated_at.is_none());
        assert!(!state.is_unlocked());
    }
}
