//! Errors raised by the fingerprint module and lock drivers.
//!
//! These stay close to the wire. The biometric layer maps them onto the
//! kiosk-wide error taxonomy.

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The module stopped answering on its link.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Bad checksum, unexpected confirmation code, injected fault.
    #[error("Communication error: {message}")]
    Communication { message: String },

    /// The capture could not be turned into a template.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange { slot: u16, capacity: u16 },

    /// The module has character buffers 1 and 2 only.
    #[error("Character buffer must be 1 or 2, got {0}")]
    InvalidBuffer(u8),

    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// A sysfs read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn slot_out_of_range(slot: u16, capacity: u16) -> Self {
        Self::SlotOutOfRange { slot, capacity }
    }

    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HardwareError::disconnected("R307"), "Device disconnected: R307")]
    #[case(
        HardwareError::communication("Checksum mismatch"),
        "Communication error: Checksum mismatch"
    )]
    #[case(
        HardwareError::slot_out_of_range(200, 128),
        "Slot 200 out of range (capacity 128)"
    )]
    #[case(HardwareError::InvalidBuffer(3), "Character buffer must be 1 or 2, got 3")]
    fn test_display(#[case] error: HardwareError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "gpio busy");
        let error: HardwareError = io.into();
        assert!(matches!(error, HardwareError::Io(_)));
    }
}
