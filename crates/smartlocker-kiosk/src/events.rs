//! Events published to the presentation layer.
//!
//! The coordinator never calls into a UI. It pushes [`KioskEvent`]s on a
//! bounded channel and moves on; a slow or absent consumer loses events
//! instead of stalling recognition or actuation.

use crate::enrollment::EnrollmentState;
use smartlocker_core::{AccessEvent, Error, SlotId};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Depth of the presentation event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Something the operator or the user should see.
#[derive(Debug, Clone, PartialEq)]
pub enum KioskEvent {
    /// The fingerprint module answered its handshake.
    BiometricsOnline { capacity: u16 },

    /// No usable fingerprint module; biometric features are disabled.
    BiometricsOffline { reason: String },

    /// The lock was opened for this access.
    AccessGranted(AccessEvent),

    /// An access arrived while the lock was already open.
    AccessCoalesced(AccessEvent),

    /// The face service did not recognize anyone.
    FaceRejected { reason: Option<String> },

    EnrollmentProgress {
        identity: String,
        state: EnrollmentState,
    },

    EnrollmentSucceeded { identity: String, slot: SlotId },

    EnrollmentFailed { identity: String, error: Error },

    /// Administrator logged in (`Some`) or out (`None`).
    AdminChanged { identity: Option<String> },

    /// Driving the lock failed.
    ActuatorFault { message: String },
}

impl fmt::Display for KioskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BiometricsOnline { capacity } => {
                write!(f, "Fingerprint sensor ready ({capacity} slots)")
            }
            Self::BiometricsOffline { reason } => {
                write!(f, "Fingerprint sensor offline: {reason}")
            }
            Self::AccessGranted(event) => match event.confidence {
                Some(confidence) => write!(
                    f,
                    "Access granted to {} via {} ({confidence:.1})",
                    event.identity, event.source
                ),
                None => write!(f, "Access granted to {} via {}", event.identity, event.source),
            },
            Self::AccessCoalesced(event) => write!(
                f,
                "Lock already open, ignoring {} access for {}",
                event.source, event.identity
            ),
            Self::FaceRejected { reason: Some(reason) } => {
                write!(f, "Face not recognized: {reason}")
            }
            Self::FaceRejected { reason: None } => write!(f, "Face not recognized"),
            Self::EnrollmentProgress { identity, state } => match state.prompt() {
                Some(prompt) => write!(f, "Enrolling {identity}: {prompt}"),
                None => write!(f, "Enrolling {identity}: {state}"),
            },
            Self::EnrollmentSucceeded { identity, slot } => {
                write!(f, "Fingerprint enrolled for {identity} (slot {slot})")
            }
            Self::EnrollmentFailed { identity, error } => {
                write!(f, "Enrollment failed for {identity}: {error}")
            }
            Self::AdminChanged {
                identity: Some(identity),
            } => write!(f, "Authenticated as {identity}"),
            Self::AdminChanged { identity: None } => write!(f, "Logged out"),
            Self::ActuatorFault { message } => write!(f, "Lock fault: {message}"),
        }
    }
}

/// Non-blocking sender side of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<KioskEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the presentation layer reads from.
    pub fn channel() -> (Self, mpsc::Receiver<KioskEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Publish `event`, dropping it if the consumer is full or gone.
    pub fn emit(&self, event: KioskEvent) {
        trace!(%event, "Kiosk event");
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(%event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartlocker_core::AccessSource;

    #[test]
    fn test_emit_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(KioskEvent::AdminChanged {
            identity: Some("admin".into()),
        });
        sink.emit(KioskEvent::AdminChanged { identity: None });

        assert_eq!(
            rx.try_recv().unwrap(),
            KioskEvent::AdminChanged {
                identity: Some("admin".into())
            }
        );
        assert_eq!(rx.try_recv().unwrap(), KioskEvent::AdminChanged { identity: None });
    }

    #[test]
    fn test_emit_drops_when_full() {
        let (sink, mut rx) = EventSink::channel();
        for _ in 0..EVENT_CHANNEL_CAPACITY + 5 {
            sink.emit(KioskEvent::FaceRejected { reason: None });
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_emit_without_consumer_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(KioskEvent::BiometricsOnline { capacity: 128 });
    }

    #[test]
    fn test_display() {
        let event = AccessEvent::new(AccessSource::Face, "Ana").with_confidence(91.5);
        assert_eq!(
            KioskEvent::AccessGranted(event).to_string(),
            "Access granted to Ana via Face (91.5)"
        );
        assert_eq!(
            KioskEvent::EnrollmentFailed {
                identity: "Ana".into(),
                error: Error::Mismatch,
            }
            .to_string(),
            "Enrollment failed for Ana: Fingerprint captures do not belong to the same finger"
        );
    }
}
