use thiserror::Error;

/// Errors returned by the face recognition service client.
#[derive(Debug, Error)]
pub enum FaceServiceError {
    /// The service rejected the admin token (HTTP 401)
    #[error("Face service rejected the credentials")]
    Unauthorized,

    /// Any other non-success status
    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Connection refused or timed out
    #[error("Face service unreachable: {0}")]
    Unreachable(String),

    /// Body did not parse as the expected JSON
    #[error("Invalid response from face service: {0}")]
    InvalidResponse(String),

    /// Any other transport failure
    #[error("Request to face service failed: {0}")]
    RequestFailed(String),

    /// The client could not be built from its configuration
    #[error("Face service configuration error: {0}")]
    Configuration(String),
}

impl FaceServiceError {
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Unreachable(format!("request timed out: {e}"))
        } else if e.is_connect() {
            Self::Unreachable(format!("connection failed: {e}"))
        } else {
            Self::RequestFailed(e.to_string())
        }
    }
}

impl From<FaceServiceError> for smartlocker_core::Error {
    fn from(e: FaceServiceError) -> Self {
        match e {
            FaceServiceError::Configuration(msg) => smartlocker_core::Error::Config(msg),
            other => smartlocker_core::Error::FaceService(other.to_string()),
        }
    }
}

pub type FaceServiceResult<T> = std::result::Result<T, FaceServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core_error() {
        let core: smartlocker_core::Error = FaceServiceError::Unauthorized.into();
        assert!(matches!(core, smartlocker_core::Error::FaceService(_)));

        let core: smartlocker_core::Error =
            FaceServiceError::Configuration("bad url".into()).into();
        assert_eq!(core, smartlocker_core::Error::Config("bad url".into()));
    }

    #[test]
    fn test_status_display() {
        let e = FaceServiceError::UnexpectedStatus {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(e.to_string(), "Unexpected HTTP status 503: busy");
    }
}
