//! Fingerprint enrollment workflow.
//!
//! A short-lived task that owns a [`SensorLease`] for its whole life and walks
//! the sensor through the two-capture confirm protocol:
//!
//! ```text
//! Idle -> SlotRequested -> AwaitFirstCapture -> AwaitFingerRemoval
//!      -> AwaitSecondCapture -> Committing -> Success
//! ```
//!
//! Any non-terminal state may go to `Failed`. Every wait is bounded by the
//! overall enrollment timeout, and cancellation is checked between device
//! calls, never during one. The lease is dropped when the workflow returns,
//! which hands the sensor back to the recognition poller.
//!
//! # Examples
//!
//! ```
//! use smartlocker_kiosk::enrollment::{EnrollmentMachine, EnrollmentState};
//!
//! let mut machine = EnrollmentMachine::new();
//! machine.transition_to(EnrollmentState::SlotRequested).unwrap();
//! assert!(machine.transition_to(EnrollmentState::Success).is_err());
//! machine.transition_to(EnrollmentState::Failed).unwrap();
//! assert!(machine.current_state().is_terminal());
//! ```

use crate::events::{EventSink, KioskEvent};
use smartlocker_biometric::{DeleteOutcome, FeedOutcome, SensorLease};
use smartlocker_core::{
    CaptureStage, Error, Identity, Result, SlotId, constants,
};
use smartlocker_storage::CredentialStore;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transitions kept per workflow. One successful run records seven.
const MAX_HISTORY_SIZE: usize = 16;

/// Enrollment workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentState {
    Idle,

    /// Looking for a free template slot.
    SlotRequested,

    AwaitFirstCapture,

    /// First capture taken; waiting for the finger to leave the window.
    AwaitFingerRemoval,

    AwaitSecondCapture,

    /// Merging the captures and storing the template and mapping.
    Committing,

    Success,
    Failed,
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            EnrollmentState::Idle => "Idle",
            EnrollmentState::SlotRequested => "SlotRequested",
            EnrollmentState::AwaitFirstCapture => "AwaitFirstCapture",
            EnrollmentState::AwaitFingerRemoval => "AwaitFingerRemoval",
            EnrollmentState::AwaitSecondCapture => "AwaitSecondCapture",
            EnrollmentState::Committing => "Committing",
            EnrollmentState::Success => "Success",
            EnrollmentState::Failed => "Failed",
        };
        write!(f, "{}", state_str)
    }
}

impl EnrollmentState {
    /// Check if transition to target state is valid from this state.
    ///
    /// ```
    /// use smartlocker_kiosk::enrollment::EnrollmentState;
    ///
    /// assert!(EnrollmentState::Committing.can_transition_to(&EnrollmentState::Success));
    /// assert!(EnrollmentState::AwaitFirstCapture.can_transition_to(&EnrollmentState::Failed));
    /// assert!(!EnrollmentState::Success.can_transition_to(&EnrollmentState::Failed));
    /// ```
    pub fn can_transition_to(&self, target: &EnrollmentState) -> bool {
        if *target == EnrollmentState::Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, target),
            (EnrollmentState::Idle, EnrollmentState::SlotRequested)
                | (EnrollmentState::SlotRequested, EnrollmentState::AwaitFirstCapture)
                | (EnrollmentState::AwaitFirstCapture, EnrollmentState::AwaitFingerRemoval)
                | (EnrollmentState::AwaitFingerRemoval, EnrollmentState::AwaitSecondCapture)
                | (EnrollmentState::AwaitSecondCapture, EnrollmentState::Committing)
                | (EnrollmentState::Committing, EnrollmentState::Success)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentState::Success | EnrollmentState::Failed)
    }

    /// Instruction for the person at the sensor, for states that need one.
    pub fn prompt(&self) -> Option<&'static str> {
        match self {
            EnrollmentState::AwaitFirstCapture => Some("Place your finger on the sensor"),
            EnrollmentState::AwaitFingerRemoval => Some("Remove your finger"),
            EnrollmentState::AwaitSecondCapture => Some("Place the same finger again"),
            EnrollmentState::Committing => Some("Saving fingerprint"),
            _ => None,
        }
    }
}

/// A recorded state change.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: EnrollmentState,
    pub to: EnrollmentState,
    pub timestamp: Instant,
}

/// Validated enrollment state with a bounded transition history.
#[derive(Debug)]
pub struct EnrollmentMachine {
    current_state: EnrollmentState,
    history: VecDeque<StateTransition>,
}

impl Default for EnrollmentMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrollmentMachine {
    pub fn new() -> Self {
        Self {
            current_state: EnrollmentState::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> &EnrollmentState {
        &self.current_state
    }

    /// Transitions from oldest to newest.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Move to `new_state`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the rules forbid it.
    pub fn transition_to(&mut self, new_state: EnrollmentState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
        };

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
        self.current_state = new_state;

        debug!(from = %transition.from, to = %transition.to, "Enrollment state transition");
        Ok(transition)
    }
}

/// Enrollment timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Budget for the whole workflow, slot lookup to commit.
    pub timeout: Duration,

    /// Sleep between capture or removal checks.
    pub poll_interval: Duration,

    /// Pause after the first capture before checking for removal.
    pub removal_settle: Duration,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(constants::DEFAULT_ENROLLMENT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(constants::DEFAULT_ENROLLMENT_POLL_MS),
            removal_settle: Duration::from_millis(constants::DEFAULT_REMOVAL_SETTLE_MS),
        }
    }
}

impl EnrollmentConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_removal_settle(mut self, settle: Duration) -> Self {
        self.removal_settle = settle;
        self
    }
}

/// How an enrollment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentOutcome {
    Success { slot: SlotId, identity: Identity },
    Failed(Error),
}

impl EnrollmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One enrollment run.
#[derive(Debug)]
pub struct EnrollmentWorkflow {
    identity: Identity,
    lease: SensorLease,
    store: CredentialStore,
    config: EnrollmentConfig,
    cancel: CancellationToken,
    events: EventSink,
    machine: EnrollmentMachine,
}

impl EnrollmentWorkflow {
    pub fn new(
        identity: Identity,
        lease: SensorLease,
        store: CredentialStore,
        config: EnrollmentConfig,
        cancel: CancellationToken,
        events: EventSink,
    ) -> Self {
        Self {
            identity,
            lease,
            store,
            config,
            cancel,
            events,
            machine: EnrollmentMachine::new(),
        }
    }

    pub fn state(&self) -> EnrollmentState {
        *self.machine.current_state()
    }

    /// Drive the enrollment to a terminal state.
    ///
    /// Consumes the workflow; the sensor lease is released on return.
    pub async fn run(mut self) -> EnrollmentOutcome {
        let deadline = Instant::now() + self.config.timeout;
        info!(identity = %self.identity, "Fingerprint enrollment started");

        match self.drive(deadline).await {
            Ok(slot) => {
                self.finish(EnrollmentState::Success);
                info!(identity = %self.identity, %slot, "Fingerprint enrollment succeeded");
                self.events.emit(KioskEvent::EnrollmentSucceeded {
                    identity: self.identity.to_string(),
                    slot,
                });
                EnrollmentOutcome::Success {
                    slot,
                    identity: self.identity,
                }
            }
            Err(error) => {
                self.lease.abort_enroll();
                self.finish(EnrollmentState::Failed);
                if error.is_user_facing() {
                    info!(identity = %self.identity, %error, "Fingerprint enrollment failed");
                } else {
                    warn!(identity = %self.identity, %error, "Fingerprint enrollment failed");
                }
                self.events.emit(KioskEvent::EnrollmentFailed {
                    identity: self.identity.to_string(),
                    error: error.clone(),
                });
                EnrollmentOutcome::Failed(error)
            }
        }
    }

    fn finish(&mut self, state: EnrollmentState) {
        if let Err(e) = self.machine.transition_to(state) {
            warn!(error = %e, "Enrollment ended from an unexpected state");
        }
    }

    fn advance(&mut self, state: EnrollmentState) -> Result<()> {
        self.machine.transition_to(state)?;
        if state.prompt().is_some() {
            self.events.emit(KioskEvent::EnrollmentProgress {
                identity: self.identity.to_string(),
                state,
            });
        }
        Ok(())
    }

    /// Fail fast on cancellation or an expired budget.
    fn checkpoint(&self, deadline: Instant) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::EnrollmentCancelled);
        }
        if Instant::now() >= deadline {
            return Err(Error::EnrollmentTimeout(self.config.timeout.as_millis() as u64));
        }
        Ok(())
    }

    /// Sleep up to `duration` without crossing the deadline.
    async fn pause(&self, duration: Duration, deadline: Instant) -> Result<()> {
        let wake = (Instant::now() + duration).min(deadline);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::EnrollmentCancelled),
            _ = tokio::time::sleep_until(wake) => self.checkpoint(deadline),
        }
    }

    async fn drive(&mut self, deadline: Instant) -> Result<SlotId> {
        self.advance(EnrollmentState::SlotRequested)?;
        self.checkpoint(deadline)?;
        let slot = self
            .lease
            .find_free_slot()
            .await?
            .ok_or(Error::StorageFull)?;
        debug!(%slot, "Enrolling into slot");
        self.lease.begin_enroll(slot)?;

        self.advance(EnrollmentState::AwaitFirstCapture)?;
        self.await_capture(CaptureStage::First, deadline).await?;

        self.advance(EnrollmentState::AwaitFingerRemoval)?;
        self.pause(self.config.removal_settle, deadline).await?;
        self.await_removal(deadline).await?;

        self.advance(EnrollmentState::AwaitSecondCapture)?;
        self.await_capture(CaptureStage::Second, deadline).await?;

        self.advance(EnrollmentState::Committing)?;
        self.checkpoint(deadline)?;
        let slot = self.lease.commit_enroll().await?;
        self.persist(slot).await?;
        Ok(slot)
    }

    async fn await_capture(&mut self, stage: CaptureStage, deadline: Instant) -> Result<()> {
        loop {
            self.checkpoint(deadline)?;
            match self.lease.feed_capture(stage).await? {
                FeedOutcome::Accepted => {
                    debug!(?stage, "Capture accepted");
                    return Ok(());
                }
                FeedOutcome::Retry => self.pause(self.config.poll_interval, deadline).await?,
            }
        }
    }

    async fn await_removal(&mut self, deadline: Instant) -> Result<()> {
        loop {
            self.checkpoint(deadline)?;
            if !self.lease.finger_present().await? {
                return Ok(());
            }
            self.pause(self.config.poll_interval, deadline).await?;
        }
    }

    /// Write the mapping while the lease is still held. A template the store
    /// cannot name is removed again.
    async fn persist(&mut self, slot: SlotId) -> Result<()> {
        let Err(e) = self.store.put_mapping(slot, &self.identity).await else {
            return Ok(());
        };

        warn!(%slot, error = %e, "Failed to store mapping, removing template");
        match self.lease.delete(slot).await {
            Ok(DeleteOutcome::Deleted) => debug!(%slot, "Orphan template removed"),
            Ok(DeleteOutcome::NotFound) => {}
            Err(delete_error) => {
                warn!(%slot, error = %delete_error, "Orphan template left on sensor");
            }
        }
        Err(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use smartlocker_biometric::{SensorOwner, SensorOwnership, SensorSession};
    use smartlocker_hardware::AnyFingerprintSensor;
    use smartlocker_hardware::mock::{MockFingerprintSensor, MockSensorHandle, Presentation};
    use smartlocker_storage::{Database, HashingConfig, SlotIdentity};
    use tokio::sync::mpsc;

    struct Harness {
        ownership: SensorOwnership,
        sensor: MockSensorHandle,
        store: CredentialStore,
        events: EventSink,
        rx: mpsc::Receiver<KioskEvent>,
    }

    async fn harness() -> Harness {
        let (sensor, handle) = MockFingerprintSensor::with_capacity(8);
        let session = SensorSession::initialize(AnyFingerprintSensor::Mock(sensor)).await;
        let ownership = SensorOwnership::new(session);
        ownership.assign_poller();

        let db = Database::in_memory().await.unwrap();
        let store = CredentialStore::new(db, HashingConfig::new(1024, 1, 1))
            .await
            .unwrap();
        let (events, rx) = EventSink::channel();

        Harness {
            ownership,
            sensor: handle,
            store,
            events,
            rx,
        }
    }

    fn fast_config() -> EnrollmentConfig {
        EnrollmentConfig::default()
            .with_timeout(Duration::from_secs(2))
            .with_poll_interval(Duration::from_millis(1))
            .with_removal_settle(Duration::from_millis(1))
    }

    async fn workflow(
        h: &Harness,
        name: &str,
        config: EnrollmentConfig,
        cancel: CancellationToken,
    ) -> EnrollmentWorkflow {
        let lease = h.ownership.acquire_for_enrollment().await.unwrap();
        EnrollmentWorkflow::new(
            Identity::new(name).unwrap(),
            lease,
            h.store.clone(),
            config,
            cancel,
            h.events.clone(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<KioskEvent>) -> Vec<KioskEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[rstest]
    #[case(EnrollmentState::Idle, EnrollmentState::SlotRequested, true)]
    #[case(EnrollmentState::SlotRequested, EnrollmentState::AwaitFirstCapture, true)]
    #[case(EnrollmentState::AwaitFirstCapture, EnrollmentState::AwaitFingerRemoval, true)]
    #[case(EnrollmentState::AwaitFingerRemoval, EnrollmentState::AwaitSecondCapture, true)]
    #[case(EnrollmentState::AwaitSecondCapture, EnrollmentState::Committing, true)]
    #[case(EnrollmentState::Committing, EnrollmentState::Success, true)]
    #[case(EnrollmentState::Idle, EnrollmentState::Failed, true)]
    #[case(EnrollmentState::Committing, EnrollmentState::Failed, true)]
    #[case(EnrollmentState::Idle, EnrollmentState::AwaitFirstCapture, false)]
    #[case(EnrollmentState::AwaitFirstCapture, EnrollmentState::AwaitSecondCapture, false)]
    #[case(EnrollmentState::Success, EnrollmentState::Failed, false)]
    #[case(EnrollmentState::Failed, EnrollmentState::Idle, false)]
    fn test_transition_rules(
        #[case] from: EnrollmentState,
        #[case] to: EnrollmentState,
        #[case] valid: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn test_machine_records_history() {
        let mut machine = EnrollmentMachine::new();
        machine.transition_to(EnrollmentState::SlotRequested).unwrap();
        machine
            .transition_to(EnrollmentState::AwaitFirstCapture)
            .unwrap();

        let err = machine.transition_to(EnrollmentState::Success).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        assert_eq!(machine.history().len(), 2);
        assert_eq!(machine.history()[1].to, EnrollmentState::AwaitFirstCapture);
    }

    #[tokio::test]
    async fn test_two_matching_captures_enroll() {
        let mut h = harness().await;
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.present_all([
            Presentation::Finger("ana".into()),
            Presentation::Empty,
            Presentation::Finger("ana".into()),
        ]);

        let outcome = wf.run().await;
        assert_eq!(
            outcome,
            EnrollmentOutcome::Success {
                slot: SlotId::new(1),
                identity: Identity::new("Ana").unwrap(),
            }
        );

        assert_eq!(h.sensor.template(1).as_deref(), Some("ana"));
        assert_eq!(
            h.store.get_identity_for_slot(SlotId::new(1)).await.unwrap(),
            SlotIdentity::Enrolled("Ana".into())
        );
        assert_eq!(h.ownership.owner(), SensorOwner::Poller);

        let events = drain(&mut h.rx);
        let prompts: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                KioskEvent::EnrollmentProgress { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(
            prompts,
            vec![
                EnrollmentState::AwaitFirstCapture,
                EnrollmentState::AwaitFingerRemoval,
                EnrollmentState::AwaitSecondCapture,
                EnrollmentState::Committing,
            ]
        );
        assert!(matches!(
            events.last(),
            Some(KioskEvent::EnrollmentSucceeded { slot, .. }) if *slot == SlotId::new(1)
        ));
    }

    #[tokio::test]
    async fn test_mismatch_fails_and_leaves_store_untouched() {
        let mut h = harness().await;
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.present_all([
            Presentation::Finger("left-thumb".into()),
            Presentation::Empty,
            Presentation::Finger("right-thumb".into()),
        ]);

        let outcome = wf.run().await;
        assert_eq!(outcome, EnrollmentOutcome::Failed(Error::Mismatch));

        assert_eq!(h.sensor.template_count(), 0);
        assert!(h.store.list_mappings().await.unwrap().is_empty());
        assert!(matches!(
            drain(&mut h.rx).last(),
            Some(KioskEvent::EnrollmentFailed { error: Error::Mismatch, .. })
        ));
    }

    #[tokio::test]
    async fn test_waits_for_finger_removal() {
        let h = harness().await;
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.present_all([
            Presentation::Finger("ana".into()),
            Presentation::Finger("ana".into()),
            Presentation::Finger("ana".into()),
            Presentation::Empty,
            Presentation::Smudge,
            Presentation::Finger("ana".into()),
        ]);

        assert!(wf.run().await.is_success());
        assert_eq!(h.sensor.pending_presentations(), 0);
    }

    #[tokio::test]
    async fn test_skips_occupied_slots() {
        let h = harness().await;
        h.sensor.store_template(1, "someone");
        h.sensor.store_template(2, "someone-else");
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.present_all([
            Presentation::Finger("ana".into()),
            Presentation::Empty,
            Presentation::Finger("ana".into()),
        ]);

        match wf.run().await {
            EnrollmentOutcome::Success { slot, .. } => assert_eq!(slot, SlotId::new(3)),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_sensor_is_storage_full() {
        let h = harness().await;
        for slot in 1..8 {
            h.sensor.store_template(slot, format!("finger-{slot}"));
        }
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;

        assert_eq!(wf.run().await, EnrollmentOutcome::Failed(Error::StorageFull));
    }

    #[tokio::test]
    async fn test_no_finger_times_out() {
        let h = harness().await;
        let config = fast_config().with_timeout(Duration::from_millis(50));
        let wf = workflow(&h, "Ana", config, CancellationToken::new()).await;

        assert_eq!(
            wf.run().await,
            EnrollmentOutcome::Failed(Error::EnrollmentTimeout(50))
        );
        assert_eq!(h.ownership.owner(), SensorOwner::Poller);
    }

    #[tokio::test]
    async fn test_cancellation_between_polls() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        let wf = workflow(&h, "Ana", fast_config(), cancel.clone()).await;

        let task = tokio::spawn(wf.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(
            task.await.unwrap(),
            EnrollmentOutcome::Failed(Error::EnrollmentCancelled)
        );
        assert_eq!(h.ownership.owner(), SensorOwner::Poller);
    }

    #[tokio::test]
    async fn test_device_fault_fails_immediately() {
        let h = harness().await;
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.place_finger("ana");
        h.sensor.fail_next(1);

        let start = Instant::now();
        let outcome = wf.run().await;
        assert!(matches!(outcome, EnrollmentOutcome::Failed(Error::DeviceError(_))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_store_failure_removes_template() {
        let h = harness().await;
        let wf = workflow(&h, "Ana", fast_config(), CancellationToken::new()).await;
        h.sensor.present_all([
            Presentation::Finger("ana".into()),
            Presentation::Empty,
            Presentation::Finger("ana".into()),
        ]);
        h.store.database().close().await;

        let outcome = wf.run().await;
        assert!(matches!(outcome, EnrollmentOutcome::Failed(Error::Storage(_))));
        assert_eq!(h.sensor.template(1), None);
    }
}
