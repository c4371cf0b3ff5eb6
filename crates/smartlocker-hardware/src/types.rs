//! Common types shared across hardware device implementations.
//!
//! This module defines the values exchanged with the fingerprint sensor and
//! the lock actuator: device metadata, capture and model status codes, search
//! hits and output levels.

use serde::{Deserialize, Serialize};

/// What a device reports about itself, used for log lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub model: String,
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            firmware_version: None,
        }
    }

    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }
}

/// Result of asking the sensor to take an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureStatus {
    /// A finger was on the window and the image buffer now holds it.
    Captured,

    /// Nothing on the window. This is the normal idle answer.
    NoFinger,
}

/// Result of combining the two character buffers into one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelOutcome {
    /// Both buffers came from the same finger; the model is ready to store.
    Created,

    /// The buffers disagree.
    Mismatch,
}

/// A template found by a library search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Slot holding the matching template.
    pub slot: u16,

    /// Device-reported match score (higher is better).
    pub score: u16,
}

/// Output level of a two-state actuator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalLevel {
    Low,
    High,
}

impl SignalLevel {
    /// Value written to a sysfs GPIO `value` file.
    pub fn as_sysfs(&self) -> &'static str {
        match self {
            Self::Low => "0",
            Self::High => "1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_firmware() {
        let info = DeviceInfo::new("R307", "Optical Fingerprint Module");
        assert_eq!(info.firmware_version, None);

        let info = info.with_firmware_version("v1.2");
        assert_eq!(info.firmware_version.as_deref(), Some("v1.2"));
    }

    #[test]
    fn test_signal_level_sysfs() {
        assert_eq!(SignalLevel::High.as_sysfs(), "1");
        assert_eq!(SignalLevel::Low.as_sysfs(), "0");
    }

    #[test]
    fn test_search_hit_serialization() {
        let hit = SearchHit { slot: 5, score: 120 };
        let json = serde_json::to_string(&hit).unwrap();
        let back: SearchHit = serde_json::from_str(&json).unwrap();
        assert_eq!(hit, back);
    }
}
