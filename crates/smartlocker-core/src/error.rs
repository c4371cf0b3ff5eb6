use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Sensor errors
    #[error("Sensor communication fault: {0}")]
    DeviceError(String),

    #[error("Fingerprint sensor unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Fingerprint captures do not belong to the same finger")]
    Mismatch,

    #[error("Fingerprint storage is full")]
    StorageFull,

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Biometric subsystem is not ready")]
    SensorUnavailable,

    // Enrollment errors
    #[error("An enrollment is already in progress")]
    EnrollmentInProgress,

    #[error("Enrollment timed out after {0}ms")]
    EnrollmentTimeout(u64),

    #[error("Enrollment cancelled")]
    EnrollmentCancelled,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Session errors
    #[error("Administrator authentication required")]
    Unauthorized,

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    // Collaborator errors
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Face service error: {0}")]
    FaceService(String),

    #[error("Actuator unavailable: {0}")]
    ActuatorUnavailable(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the operation can simply be retried after a short backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DeviceError(_))
    }

    /// Whether the error is an expected outcome that should be shown to the
    /// operator rather than treated as a bug.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Mismatch
                | Self::StorageFull
                | Self::Unauthorized
                | Self::SensorUnavailable
                | Self::DeviceUnavailable(_)
                | Self::EnrollmentInProgress
                | Self::EnrollmentTimeout(_)
                | Self::EnrollmentCancelled
                | Self::InvalidIdentity(_)
                | Self::InvalidSecret(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
