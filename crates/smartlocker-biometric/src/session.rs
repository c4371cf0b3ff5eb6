//! Sensor session: the fault-translating boundary around the fingerprint module.
//!
//! A [`SensorSession`] is either connected to a working module or explicitly
//! [`Unavailable`](SensorSession::Unavailable). The variant is picked once by
//! [`SensorSession::initialize`] and never changes afterwards, so the rest of
//! the kiosk treats biometrics as an optional capability instead of checking a
//! substitute object.
//!
//! Every [`HardwareError`] is translated here into the core taxonomy:
//!
//! | Device fault | Core error |
//! |---|---|
//! | `Disconnected` | `Error::DeviceUnavailable` |
//! | `SlotOutOfRange` while storing | `Error::StorageFull` |
//! | `SlotOutOfRange` elsewhere | `Error::InvalidSlot` |
//! | unreadable image | `FeedOutcome::Retry` / `Ok(None)` |
//! | anything else | `Error::DeviceError` (transient) |

use smartlocker_core::{CaptureStage, Error, Result, SlotId, constants::FIRST_SLOT_ID};
use smartlocker_hardware::{
    AnyFingerprintSensor, CaptureStatus, FingerprintSensor, HardwareError, ModelOutcome,
};
use std::fmt;
use tracing::{debug, info, warn};

/// Whether the module can currently be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Disconnected,
    Ready,
    /// Connected, but a multi-step enrollment is in progress.
    Busy,
}

/// What the holder of the session is currently doing with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorMode {
    #[default]
    Idle,
    Polling,
    Enrolling,
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Polling => write!(f, "Polling"),
            Self::Enrolling => write!(f, "Enrolling"),
        }
    }
}

/// A library hit for the finger currently on the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorMatch {
    pub slot: SlotId,
    pub score: u16,
}

/// Result of one enrollment capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The capture was converted into the stage's character buffer.
    Accepted,

    /// No finger, or an image too poor to use. Try again.
    Retry,
}

/// Result of deleting a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Progress of the enrollment protocol on a connected module.
#[derive(Debug, Clone, Copy, Default)]
struct EnrollProgress {
    slot: Option<SlotId>,
    first: bool,
    second: bool,
}

/// A module that answered the handshake.
#[derive(Debug)]
pub struct ConnectedSensor {
    device: AnyFingerprintSensor,
    capacity: u16,
    mode: SensorMode,
    enroll: EnrollProgress,
}

/// Exclusive handle on the fingerprint module.
#[derive(Debug)]
pub enum SensorSession {
    Connected(ConnectedSensor),
    Unavailable { reason: String },
}

fn device_fault(error: HardwareError) -> Error {
    match error {
        HardwareError::Disconnected { device } => Error::DeviceUnavailable(device),
        HardwareError::SlotOutOfRange { slot, capacity } => {
            Error::InvalidSlot(format!("{slot} (capacity {capacity})"))
        }
        other => Error::DeviceError(other.to_string()),
    }
}

impl SensorSession {
    /// Handshake with `device` and read its capacity.
    ///
    /// Never fails: any problem yields [`SensorSession::Unavailable`] carrying
    /// the reason.
    pub async fn initialize(mut device: AnyFingerprintSensor) -> Self {
        match device.check_module().await {
            Ok(true) => {}
            Ok(false) => return Self::unavailable("Sensor rejected the handshake"),
            Err(e) => return Self::unavailable(format!("Sensor handshake failed: {e}")),
        }

        let capacity = match device.capacity().await {
            Ok(capacity) => capacity,
            Err(e) => return Self::unavailable(format!("Could not read sensor capacity: {e}")),
        };

        match device.get_device_info().await {
            Ok(info) => info!(name = %info.name, model = %info.model, capacity, "Fingerprint sensor ready"),
            Err(e) => debug!(error = %e, capacity, "Fingerprint sensor ready without device info"),
        }

        Self::Connected(ConnectedSensor {
            device,
            capacity,
            mode: SensorMode::Idle,
            enroll: EnrollProgress::default(),
        })
    }

    /// Session for a kiosk without a usable sensor.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "Fingerprint sensor unavailable, biometrics disabled");
        Self::Unavailable { reason }
    }

    pub fn connectivity(&self) -> Connectivity {
        match self {
            Self::Unavailable { .. } => Connectivity::Disconnected,
            Self::Connected(sensor) if sensor.mode == SensorMode::Enrolling => Connectivity::Busy,
            Self::Connected(_) => Connectivity::Ready,
        }
    }

    pub fn mode(&self) -> SensorMode {
        match self {
            Self::Connected(sensor) => sensor.mode,
            Self::Unavailable { .. } => SensorMode::Idle,
        }
    }

    /// Template capacity, or `None` when no module is connected.
    pub fn capacity(&self) -> Option<u16> {
        match self {
            Self::Connected(sensor) => Some(sensor.capacity),
            Self::Unavailable { .. } => None,
        }
    }

    /// Why the session is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Unavailable { reason } => Some(reason),
            Self::Connected(_) => None,
        }
    }

    fn connected(&mut self) -> Result<&mut ConnectedSensor> {
        match self {
            Self::Connected(sensor) => Ok(sensor),
            Self::Unavailable { reason } => Err(Error::DeviceUnavailable(reason.clone())),
        }
    }

    /// Lowest slot with no stored template.
    ///
    /// Returns `Ok(None)` when every slot is taken or no module is connected.
    pub async fn find_free_slot(&mut self) -> Result<Option<SlotId>> {
        let Self::Connected(sensor) = self else {
            return Ok(None);
        };

        for id in FIRST_SLOT_ID..sensor.capacity {
            let occupied = sensor.device.load_model(id).await.map_err(device_fault)?;
            if !occupied {
                debug!(slot = id, "Found free slot");
                return Ok(Some(SlotId::new(id)));
            }
        }
        Ok(None)
    }

    /// One capture-and-search attempt.
    ///
    /// No finger, an unreadable image and a library miss are all `Ok(None)`.
    pub async fn capture_and_match(&mut self) -> Result<Option<SensorMatch>> {
        let sensor = self.connected()?;
        if sensor.mode == SensorMode::Enrolling {
            return Err(Error::EnrollmentInProgress);
        }
        sensor.mode = SensorMode::Polling;

        match sensor.device.get_image().await.map_err(device_fault)? {
            CaptureStatus::NoFinger => return Ok(None),
            CaptureStatus::Captured => {}
        }

        match sensor.device.image_to_template(1).await {
            Ok(()) => {}
            Err(HardwareError::InvalidData { message }) => {
                debug!(%message, "Discarding unreadable capture");
                return Ok(None);
            }
            Err(e) => return Err(device_fault(e)),
        }

        let hit = sensor.device.search().await.map_err(device_fault)?;
        Ok(hit.map(|hit| SensorMatch {
            slot: SlotId::new(hit.slot),
            score: hit.score,
        }))
    }

    /// Start enrolling into `slot`.
    pub fn begin_enroll(&mut self, slot: SlotId) -> Result<()> {
        let sensor = self.connected()?;
        if !slot.fits(sensor.capacity) {
            return Err(Error::InvalidSlot(format!(
                "{slot} (capacity {})",
                sensor.capacity
            )));
        }
        if sensor.mode == SensorMode::Enrolling {
            return Err(Error::EnrollmentInProgress);
        }

        sensor.mode = SensorMode::Enrolling;
        sensor.enroll = EnrollProgress {
            slot: Some(slot),
            ..Default::default()
        };
        Ok(())
    }

    fn enrolling(&mut self) -> Result<&mut ConnectedSensor> {
        let sensor = self.connected()?;
        if sensor.mode != SensorMode::Enrolling {
            return Err(Error::InvalidStateTransition {
                from: sensor.mode.to_string(),
                to: SensorMode::Enrolling.to_string(),
            });
        }
        Ok(sensor)
    }

    /// Try once to capture the finger for `stage`.
    pub async fn feed_capture(&mut self, stage: CaptureStage) -> Result<FeedOutcome> {
        let sensor = self.enrolling()?;

        match sensor.device.get_image().await.map_err(device_fault)? {
            CaptureStatus::NoFinger => return Ok(FeedOutcome::Retry),
            CaptureStatus::Captured => {}
        }

        match sensor.device.image_to_template(stage.buffer_index()).await {
            Ok(()) => {}
            Err(HardwareError::InvalidData { message }) => {
                debug!(?stage, %message, "Capture unreadable, retrying");
                return Ok(FeedOutcome::Retry);
            }
            Err(e) => return Err(device_fault(e)),
        }

        match stage {
            CaptureStage::First => sensor.enroll.first = true,
            CaptureStage::Second => sensor.enroll.second = true,
        }
        Ok(FeedOutcome::Accepted)
    }

    /// Merge both captures and store the model in the slot given to
    /// [`begin_enroll`](Self::begin_enroll).
    ///
    /// # Errors
    ///
    /// `Error::Mismatch` if the captures belong to different fingers,
    /// `Error::StorageFull` if the device refuses the slot, and
    /// `Error::DeviceError` for communication faults.
    pub async fn commit_enroll(&mut self) -> Result<SlotId> {
        let sensor = self.enrolling()?;
        let progress = sensor.enroll;
        let slot = match progress {
            EnrollProgress {
                slot: Some(slot),
                first: true,
                second: true,
            } => slot,
            _ => {
                return Err(Error::InvalidStateTransition {
                    from: "partial capture".into(),
                    to: "commit".into(),
                });
            }
        };

        match sensor.device.create_model().await.map_err(device_fault)? {
            ModelOutcome::Created => {}
            ModelOutcome::Mismatch => return Err(Error::Mismatch),
        }

        sensor
            .device
            .store_model(slot.as_u16())
            .await
            .map_err(|e| match e {
                HardwareError::SlotOutOfRange { .. } => Error::StorageFull,
                other => device_fault(other),
            })?;

        sensor.mode = SensorMode::Idle;
        sensor.enroll = EnrollProgress::default();
        info!(%slot, "Fingerprint template stored");
        Ok(slot)
    }

    /// Drop any partial enrollment. The module keeps no state between
    /// captures, so this only resets the session.
    pub fn abort_enroll(&mut self) {
        if let Self::Connected(sensor) = self
            && sensor.mode == SensorMode::Enrolling
        {
            debug!(slot = ?sensor.enroll.slot, "Enrollment aborted");
            sensor.mode = SensorMode::Idle;
            sensor.enroll = EnrollProgress::default();
        }
    }

    /// Mark the sensor idle once the poller has let go of it.
    pub fn stand_down(&mut self) {
        if let Self::Connected(sensor) = self
            && sensor.mode == SensorMode::Polling
        {
            sensor.mode = SensorMode::Idle;
        }
    }

    /// Whether a finger is on the window right now.
    pub async fn finger_present(&mut self) -> Result<bool> {
        let sensor = self.connected()?;
        let status = sensor.device.get_image().await.map_err(device_fault)?;
        Ok(status == CaptureStatus::Captured)
    }

    /// Remove the template in `slot`.
    pub async fn delete(&mut self, slot: SlotId) -> Result<DeleteOutcome> {
        let sensor = self.connected()?;
        if !slot.fits(sensor.capacity) {
            return Ok(DeleteOutcome::NotFound);
        }

        let deleted = sensor
            .device
            .delete_model(slot.as_u16())
            .await
            .map_err(device_fault)?;
        Ok(if deleted {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    /// Number of stored templates.
    pub async fn template_count(&mut self) -> Result<u16> {
        let sensor = self.connected()?;
        sensor.device.template_count().await.map_err(device_fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use smartlocker_hardware::mock::{
        MockFingerprintSensor, MockSensorHandle, Presentation, SensorCall,
    };

    async fn connected(capacity: u16) -> (SensorSession, MockSensorHandle) {
        let (sensor, handle) = MockFingerprintSensor::with_capacity(capacity);
        let session = SensorSession::initialize(AnyFingerprintSensor::Mock(sensor)).await;
        (session, handle)
    }

    fn finger(tag: &str) -> Presentation {
        Presentation::Finger(tag.to_string())
    }

    #[tokio::test]
    async fn test_initialize_ready() {
        let (session, _handle) = connected(64).await;
        assert_eq!(session.connectivity(), Connectivity::Ready);
        assert_eq!(session.mode(), SensorMode::Idle);
        assert_eq!(session.capacity(), Some(64));
    }

    #[tokio::test]
    async fn test_initialize_degrades_on_rejected_handshake() {
        let (sensor, handle) = MockFingerprintSensor::new();
        handle.set_handshake(false);

        let session = SensorSession::initialize(AnyFingerprintSensor::Mock(sensor)).await;
        assert_eq!(session.connectivity(), Connectivity::Disconnected);
        assert!(session.unavailable_reason().is_some());
    }

    #[tokio::test]
    async fn test_initialize_degrades_on_disconnect() {
        let (sensor, handle) = MockFingerprintSensor::new();
        handle.set_disconnected(true);

        let session = SensorSession::initialize(AnyFingerprintSensor::Mock(sensor)).await;
        assert!(matches!(session, SensorSession::Unavailable { .. }));
        assert_eq!(session.capacity(), None);
    }

    #[tokio::test]
    async fn test_unavailable_session_operations() {
        let mut session = SensorSession::unavailable("not configured");

        assert_eq!(session.find_free_slot().await.unwrap(), None);
        assert!(matches!(
            session.capture_and_match().await,
            Err(Error::DeviceUnavailable(_))
        ));
        assert!(matches!(
            session.begin_enroll(SlotId::new(1)),
            Err(Error::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_find_free_slot_skips_occupied() {
        let (mut session, handle) = connected(128).await;
        handle.store_template(1, "a");
        handle.store_template(2, "b");

        assert_eq!(session.find_free_slot().await.unwrap(), Some(SlotId::new(3)));
    }

    #[tokio::test]
    async fn test_find_free_slot_exhausted() {
        let (mut session, handle) = connected(4).await;
        for slot in 1..4 {
            handle.store_template(slot, format!("user{slot}"));
        }

        assert_eq!(session.find_free_slot().await.unwrap(), None);
        assert_eq!(
            handle.calls(),
            vec![
                SensorCall::CheckModule,
                SensorCall::LoadModel(1),
                SensorCall::LoadModel(2),
                SensorCall::LoadModel(3)
            ]
        );
    }

    #[tokio::test]
    async fn test_capture_and_match_hit() {
        let (mut session, handle) = connected(128).await;
        handle.store_template(9, "kim");
        handle.place_finger("kim");

        let hit = session.capture_and_match().await.unwrap().unwrap();
        assert_eq!(hit.slot, SlotId::new(9));
        assert_eq!(session.mode(), SensorMode::Polling);
    }

    #[rstest]
    #[case(Presentation::Empty)]
    #[case(Presentation::Smudge)]
    #[case(Presentation::Finger("stranger".into()))]
    #[tokio::test]
    async fn test_capture_and_match_misses_are_none(#[case] presentation: Presentation) {
        let (mut session, handle) = connected(128).await;
        handle.store_template(9, "kim");
        handle.present(presentation);

        assert_eq!(session.capture_and_match().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_communication_fault_is_transient() {
        let (mut session, handle) = connected(128).await;
        handle.fail_next(1);

        let error = session.capture_and_match().await.unwrap_err();
        assert!(error.is_transient());
        assert_eq!(session.capture_and_match().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disconnect_maps_to_unavailable() {
        let (mut session, handle) = connected(128).await;
        handle.set_disconnected(true);

        assert!(matches!(
            session.capture_and_match().await,
            Err(Error::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_full_enrollment_protocol() {
        let (mut session, handle) = connected(128).await;
        handle.present_all([
            Presentation::Empty,
            finger("lee"),
            Presentation::Smudge,
            finger("lee"),
        ]);

        session.begin_enroll(SlotId::new(5)).unwrap();
        assert_eq!(session.connectivity(), Connectivity::Busy);

        assert_eq!(
            session.feed_capture(CaptureStage::First).await.unwrap(),
            FeedOutcome::Retry
        );
        assert_eq!(
            session.feed_capture(CaptureStage::First).await.unwrap(),
            FeedOutcome::Accepted
        );
        assert_eq!(
            session.feed_capture(CaptureStage::Second).await.unwrap(),
            FeedOutcome::Retry
        );
        assert_eq!(
            session.feed_capture(CaptureStage::Second).await.unwrap(),
            FeedOutcome::Accepted
        );

        assert_eq!(session.commit_enroll().await.unwrap(), SlotId::new(5));
        assert_eq!(handle.template(5), Some("lee".to_string()));
        assert_eq!(session.connectivity(), Connectivity::Ready);
    }

    #[tokio::test]
    async fn test_commit_mismatch() {
        let (mut session, handle) = connected(128).await;
        handle.present_all([finger("one"), finger("two")]);

        session.begin_enroll(SlotId::new(5)).unwrap();
        session.feed_capture(CaptureStage::First).await.unwrap();
        session.feed_capture(CaptureStage::Second).await.unwrap();

        assert_eq!(session.commit_enroll().await, Err(Error::Mismatch));
        assert_eq!(handle.template_count(), 0);

        session.abort_enroll();
        assert_eq!(session.mode(), SensorMode::Idle);
    }

    #[tokio::test]
    async fn test_commit_requires_both_captures() {
        let (mut session, handle) = connected(128).await;
        handle.present(finger("one"));

        session.begin_enroll(SlotId::new(5)).unwrap();
        session.feed_capture(CaptureStage::First).await.unwrap();

        assert!(matches!(
            session.commit_enroll().await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_feed_without_begin_is_rejected() {
        let (mut session, _handle) = connected(128).await;
        assert!(matches!(
            session.feed_capture(CaptureStage::First).await,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_begin_enroll_rejects_slot_outside_capacity() {
        let (mut session, _handle) = connected(16).await;
        assert!(matches!(
            session.begin_enroll(SlotId::new(16)),
            Err(Error::InvalidSlot(_))
        ));
        assert!(matches!(
            session.begin_enroll(SlotId::new(0)),
            Err(Error::InvalidSlot(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_and_match_refused_while_enrolling() {
        let (mut session, _handle) = connected(128).await;
        session.begin_enroll(SlotId::new(1)).unwrap();

        assert_eq!(
            session.capture_and_match().await,
            Err(Error::EnrollmentInProgress)
        );
    }

    #[tokio::test]
    async fn test_abort_then_poll_works() {
        let (mut session, handle) = connected(128).await;
        handle.store_template(2, "max");
        handle.present(finger("max"));

        session.begin_enroll(SlotId::new(3)).unwrap();
        session.feed_capture(CaptureStage::First).await.unwrap();
        session.abort_enroll();

        handle.place_finger("max");
        let hit = session.capture_and_match().await.unwrap().unwrap();
        assert_eq!(hit.slot, SlotId::new(2));
    }

    #[tokio::test]
    async fn test_finger_present() {
        let (mut session, handle) = connected(128).await;
        assert!(!session.finger_present().await.unwrap());

        handle.place_finger("ned");
        assert!(session.finger_present().await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let (mut session, handle) = connected(128).await;
        handle.store_template(4, "oli");

        assert_eq!(
            session.delete(SlotId::new(4)).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            session.delete(SlotId::new(4)).await.unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            session.delete(SlotId::new(500)).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_template_count() {
        let (mut session, handle) = connected(128).await;
        handle.store_template(1, "a");
        handle.store_template(7, "b");
        assert_eq!(session.template_count().await.unwrap(), 2);
    }
}
