//! Access session coordinator.
//!
//! The [`AccessCoordinator`] owns every long-lived piece of the kiosk: the
//! sensor ownership token, the recognition poller, the actuator arbiter and
//! the administrator session. It is the only thing a front end talks to.
//!
//! Start-up never blocks on the fingerprint module. The sensor handshake runs
//! in a background task; until it finishes the kiosk reports
//! [`BiometricStatus::Initializing`] and fingerprint operations are refused
//! with `Error::SensorUnavailable`. Face and manual access work throughout.

use crate::enrollment::{EnrollmentConfig, EnrollmentOutcome, EnrollmentWorkflow};
use crate::events::{EventSink, KioskEvent};
use chrono::{DateTime, Utc};
use smartlocker_actuator::{ActivationOutcome, ArbiterConfig, ArbiterHandle, ActuatorArbiter};
use smartlocker_biometric::{
    DeleteOutcome, FingerprintMatch, PollerConfig, PollerState, PollerStats, RecognitionPoller,
    SensorOwner, SensorOwnership, SensorSession,
};
use smartlocker_core::{
    AccessEvent, AccessSource, ActuatorState, Error, Identity, Result, SlotId, constants,
};
use smartlocker_hardware::{AnyActuator, AnyFingerprintSensor};
use smartlocker_network::{FaceServiceClient, FaceVerdict};
use smartlocker_storage::{CredentialStore, SlotIdentity};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Depth of the poller-to-dispatcher match channel.
const MATCH_CHANNEL_CAPACITY: usize = 8;

/// Timing and policy for the coordinator's background tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub poller: PollerConfig,
    pub enrollment: EnrollmentConfig,
    pub arbiter: ArbiterConfig,

    /// Retrain the face model after every successful registration.
    pub auto_train_faces: bool,
}

/// Devices and services the coordinator is built from.
#[derive(Debug)]
pub struct KioskComponents {
    /// `None` runs the kiosk without fingerprint support.
    pub sensor: Option<AnyFingerprintSensor>,
    pub actuator: AnyActuator,
    pub store: CredentialStore,
    pub face: Option<FaceServiceClient>,
}

/// Who is logged in at the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdminSession {
    #[default]
    Anonymous,
    Authenticated { identity: String },
}

impl AdminSession {
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated { identity } => Some(identity),
        }
    }
}

/// Availability of the fingerprint subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BiometricStatus {
    /// The sensor handshake has not finished yet.
    #[default]
    Initializing,
    Ready,
    /// No module, or it failed its handshake. Fingerprint features stay off.
    Offline,
}

impl fmt::Display for BiometricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Point-in-time view of the kiosk for a status screen.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub biometrics: BiometricStatus,
    pub admin: Option<String>,
    pub sensor_owner: SensorOwner,
    pub poller: PollerState,
    pub poller_stats: PollerStats,
    pub lock: ActuatorState,
    pub enrollment_active: bool,
    pub enrolled_fingerprints: usize,
    pub face_service: bool,
    pub started_at: DateTime<Utc>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Biometrics:   {}", self.biometrics)?;
        writeln!(f, "Sensor owner: {}", self.sensor_owner)?;
        writeln!(
            f,
            "Poller:       {:?} ({} polls, {} matches, {} faults)",
            self.poller, self.poller_stats.polls, self.poller_stats.matches, self.poller_stats.faults
        )?;
        writeln!(f, "Lock:         {:?}", self.lock.position)?;
        writeln!(f, "Enrolled:     {}", self.enrolled_fingerprints)?;
        writeln!(
            f,
            "Face service: {}",
            if self.face_service { "configured" } else { "off" }
        )?;
        match &self.admin {
            Some(identity) => write!(f, "Admin:        {identity}"),
            None => write!(f, "Admin:        (none)"),
        }
    }
}

/// A running enrollment.
#[derive(Debug)]
pub struct EnrollmentTicket {
    identity: Identity,
    task: JoinHandle<EnrollmentOutcome>,
}

impl EnrollmentTicket {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Wait for the enrollment to reach a terminal state.
    pub async fn outcome(self) -> EnrollmentOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => EnrollmentOutcome::Failed(Error::EnrollmentCancelled),
            Err(e) => EnrollmentOutcome::Failed(Error::DeviceError(format!(
                "Enrollment task failed: {e}"
            ))),
        }
    }
}

#[derive(Debug)]
struct ActiveEnrollment {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    ownership: SensorOwnership,
    store: CredentialStore,
    arbiter: ArbiterHandle,
    face: Option<FaceServiceClient>,
    events: EventSink,
    settings: CoordinatorSettings,
    session: Mutex<AdminSession>,
    biometrics: watch::Sender<BiometricStatus>,
    poller_state: watch::Receiver<PollerState>,
    poller_stats: watch::Receiver<PollerStats>,
    enrollment: Mutex<Option<ActiveEnrollment>>,
    next_enrollment: AtomicU64,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Front door of the kiosk. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AccessCoordinator {
    inner: Arc<Inner>,
}

impl AccessCoordinator {
    /// Bring the kiosk up.
    ///
    /// Seeds the default administrator, spawns the actuator arbiter and
    /// starts sensor initialization in the background. Returns as soon as the
    /// tasks are running, together with the receiver for presentation events.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the default administrator cannot be
    /// seeded.
    pub async fn start(
        components: KioskComponents,
        settings: CoordinatorSettings,
    ) -> Result<(Self, mpsc::Receiver<KioskEvent>)> {
        let KioskComponents {
            sensor,
            actuator,
            store,
            face,
        } = components;

        store.ensure_default_admin().await?;

        let shutdown = CancellationToken::new();
        let (events, events_rx) = EventSink::channel();
        let (arbiter, arbiter_task) =
            ActuatorArbiter::spawn(actuator, settings.arbiter.clone(), shutdown.clone());

        let ownership = SensorOwnership::new(SensorSession::Unavailable {
            reason: "Sensor initializing".into(),
        });
        let (match_tx, match_rx) = mpsc::channel(MATCH_CHANNEL_CAPACITY);
        let poller = RecognitionPoller::new(
            ownership.clone(),
            settings.poller.clone(),
            match_tx,
            shutdown.clone(),
        );
        let (biometrics, _) = watch::channel(BiometricStatus::Initializing);

        let coordinator = Self {
            inner: Arc::new(Inner {
                ownership,
                store,
                arbiter,
                face,
                events,
                poller_state: poller.state(),
                poller_stats: poller.stats(),
                settings,
                session: Mutex::new(AdminSession::Anonymous),
                biometrics,
                enrollment: Mutex::new(None),
                next_enrollment: AtomicU64::new(1),
                shutdown,
                tasks: Mutex::new(vec![arbiter_task]),
                started_at: Utc::now(),
            }),
        };

        coordinator.spawn(coordinator.clone().run_sensor(sensor, poller));
        coordinator.spawn(coordinator.clone().dispatch_matches(match_rx));
        coordinator.spawn(coordinator.clone().forward_faults());

        info!(
            face_service = coordinator.inner.face.is_some(),
            "Access coordinator started"
        );
        Ok((coordinator, events_rx))
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        lock(&self.inner.tasks).push(tokio::spawn(task));
    }

    async fn run_sensor(self, sensor: Option<AnyFingerprintSensor>, poller: RecognitionPoller) {
        let session = match sensor {
            Some(device) => SensorSession::initialize(device).await,
            None => SensorSession::unavailable("No fingerprint sensor configured"),
        };
        let capacity = session.capacity();
        let reason = session.unavailable_reason().unwrap_or_default().to_string();
        self.inner.ownership.install(session).await;

        let Some(capacity) = capacity else {
            self.inner.biometrics.send_replace(BiometricStatus::Offline);
            self.inner
                .events
                .emit(KioskEvent::BiometricsOffline { reason });
            return;
        };

        // The poller must own the sensor before enrollment can see `Ready`.
        self.inner.ownership.assign_poller();
        self.inner.biometrics.send_replace(BiometricStatus::Ready);
        self.inner
            .events
            .emit(KioskEvent::BiometricsOnline { capacity });
        poller.run().await;
    }

    async fn dispatch_matches(self, mut matches: mpsc::Receiver<FingerprintMatch>) {
        while let Some(hit) = matches.recv().await {
            let identity = match self.inner.store.get_identity_for_slot(hit.slot).await {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(slot = %hit.slot, error = %e, "Identity lookup failed");
                    SlotIdentity::Unknown
                }
            };
            if !identity.is_known() {
                warn!(slot = %hit.slot, "Matched template has no enrolled identity");
            }

            let event = AccessEvent::new(AccessSource::Fingerprint, identity.display_name())
                .with_confidence(f64::from(hit.score));
            if let Err(e) = self.activate(event).await {
                warn!(error = %e, "Fingerprint access dropped");
            }
        }
        debug!("Match dispatcher stopped");
    }

    async fn forward_faults(self) {
        let mut faults = self.inner.arbiter.faults();
        loop {
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                fault = faults.recv() => match fault {
                    Ok(fault) => self.inner.events.emit(KioskEvent::ActuatorFault {
                        message: format!("{} failed: {}", fault.operation, fault.message),
                    }),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Actuator faults dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn activate(&self, event: AccessEvent) -> Result<ActivationOutcome> {
        let outcome = self.inner.arbiter.submit(event.clone()).await?;
        match &outcome {
            ActivationOutcome::Activated => {
                info!(source = %event.source, identity = %event.identity, "Access granted");
                self.inner.events.emit(KioskEvent::AccessGranted(event));
            }
            ActivationOutcome::Coalesced => {
                debug!(source = %event.source, identity = %event.identity, "Access coalesced");
                self.inner.events.emit(KioskEvent::AccessCoalesced(event));
            }
            ActivationOutcome::Faulted(message) => {
                self.inner.events.emit(KioskEvent::ActuatorFault {
                    message: message.clone(),
                });
            }
        }
        Ok(outcome)
    }

    fn require_admin(&self) -> Result<String> {
        lock(&self.inner.session)
            .identity()
            .map(str::to_owned)
            .ok_or(Error::Unauthorized)
    }

    fn require_biometrics(&self) -> Result<()> {
        if self.biometric_status() == BiometricStatus::Ready {
            Ok(())
        } else {
            Err(Error::SensorUnavailable)
        }
    }

    fn face_client(&self) -> Result<&FaceServiceClient> {
        self.inner
            .face
            .as_ref()
            .ok_or_else(|| Error::FaceService("Face service not configured".into()))
    }

    pub fn biometric_status(&self) -> BiometricStatus {
        *self.inner.biometrics.borrow()
    }

    /// Receiver notified when sensor initialization finishes.
    pub fn subscribe_biometrics(&self) -> watch::Receiver<BiometricStatus> {
        self.inner.biometrics.subscribe()
    }

    pub fn admin_session(&self) -> AdminSession {
        lock(&self.inner.session).clone()
    }

    pub fn lock_state(&self) -> ActuatorState {
        self.inner.arbiter.state()
    }

    pub fn subscribe_lock(&self) -> watch::Receiver<ActuatorState> {
        self.inner.arbiter.subscribe()
    }

    /// Log an administrator in.
    ///
    /// A failed attempt leaves the current session as it was.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` for an unknown identity or a wrong
    /// secret, without saying which.
    pub async fn authenticate(&self, identity: &str, secret: &str) -> Result<()> {
        let identity = identity.trim();
        if identity.is_empty() || secret.is_empty() {
            return Err(Error::Unauthorized);
        }
        if !self.inner.store.verify_admin(identity, secret).await? {
            warn!(identity, "Administrator login rejected");
            return Err(Error::Unauthorized);
        }

        *lock(&self.inner.session) = AdminSession::Authenticated {
            identity: identity.to_string(),
        };
        info!(identity, "Administrator logged in");
        self.inner.events.emit(KioskEvent::AdminChanged {
            identity: Some(identity.to_string()),
        });
        Ok(())
    }

    /// End the administrator session. Returns `false` if nobody was logged in.
    pub fn logout(&self) -> bool {
        let previous = std::mem::take(&mut *lock(&self.inner.session));
        let Some(identity) = previous.identity() else {
            return false;
        };
        info!(identity, "Administrator logged out");
        self.inner
            .events
            .emit(KioskEvent::AdminChanged { identity: None });
        true
    }

    /// Change the logged-in administrator's secret.
    pub async fn change_admin_secret(&self, new_secret: &str) -> Result<()> {
        let identity = self.require_admin()?;
        if new_secret.trim().is_empty() {
            return Err(Error::InvalidSecret("Secret must not be blank".into()));
        }
        self.inner
            .store
            .set_admin_secret(&identity, new_secret)
            .await?;
        info!(identity = %identity, "Administrator secret changed");
        Ok(())
    }

    /// Start enrolling a fingerprint for `identity`.
    ///
    /// Returns once the sensor has been taken from the poller; the capture
    /// protocol continues in the background and reports through
    /// [`KioskEvent::EnrollmentProgress`].
    ///
    /// # Errors
    ///
    /// - `Error::Unauthorized` without an administrator session
    /// - `Error::InvalidIdentity` for a blank or oversized name
    /// - `Error::SensorUnavailable` if the fingerprint module is not ready
    /// - `Error::EnrollmentInProgress` if another enrollment holds the sensor
    pub async fn begin_enrollment(&self, identity: &str) -> Result<EnrollmentTicket> {
        self.require_admin()?;
        let identity = Identity::new(identity)?;
        self.require_biometrics()?;

        let lease = self.inner.ownership.acquire_for_enrollment().await?;
        let cancel = self.inner.shutdown.child_token();
        let id = self.inner.next_enrollment.fetch_add(1, Ordering::Relaxed);
        *lock(&self.inner.enrollment) = Some(ActiveEnrollment {
            id,
            cancel: cancel.clone(),
        });

        let workflow = EnrollmentWorkflow::new(
            identity.clone(),
            lease,
            self.inner.store.clone(),
            self.inner.settings.enrollment.clone(),
            cancel,
            self.inner.events.clone(),
        );
        let coordinator = self.clone();
        let task = tokio::spawn(async move {
            let outcome = workflow.run().await;
            coordinator.clear_enrollment(id);
            outcome
        });

        Ok(EnrollmentTicket { identity, task })
    }

    fn clear_enrollment(&self, id: u64) {
        let mut active = lock(&self.inner.enrollment);
        if active.as_ref().is_some_and(|enrollment| enrollment.id == id) {
            *active = None;
        }
    }

    /// Cancel the running enrollment. Returns `false` if there is none.
    pub fn cancel_enrollment(&self) -> bool {
        match lock(&self.inner.enrollment).as_ref() {
            Some(enrollment) if !enrollment.cancel.is_cancelled() => {
                enrollment.cancel.cancel();
                info!("Enrollment cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub fn enrollment_active(&self) -> bool {
        lock(&self.inner.enrollment).is_some()
    }

    /// Open the lock on the administrator's authority.
    pub async fn manual_activate(&self) -> Result<ActivationOutcome> {
        let identity = self.require_admin()?;
        self.activate(AccessEvent::new(AccessSource::Manual, identity))
            .await
    }

    /// Send a camera frame to the face service and act on the verdict.
    ///
    /// Returns `None` when nobody was recognized.
    pub async fn recognize_face(&self, image: Vec<u8>) -> Result<Option<ActivationOutcome>> {
        let verdict = self.face_client()?.recognize(image).await?;
        self.submit_face_verdict(verdict).await
    }

    /// Act on a verdict obtained from the face service.
    ///
    /// A positive verdict that names nobody still opens the lock, reported
    /// as an unknown identity.
    pub async fn submit_face_verdict(
        &self,
        verdict: FaceVerdict,
    ) -> Result<Option<ActivationOutcome>> {
        if !verdict.found {
            info!(reason = ?verdict.reason, "Face not recognized");
            self.inner.events.emit(KioskEvent::FaceRejected {
                reason: verdict.reason,
            });
            return Ok(None);
        }

        let identity = verdict
            .matched_identity()
            .unwrap_or(constants::UNKNOWN_IDENTITY);
        let mut event = AccessEvent::new(AccessSource::Face, identity);
        if let Some(confidence) = verdict.confidence {
            event = event.with_confidence(confidence);
        }
        self.activate(event).await.map(Some)
    }

    /// Upload reference images for `identity` to the face service.
    ///
    /// Retrains the model afterwards when auto-training is on. A failed
    /// retrain is logged; the images stay registered.
    pub async fn register_face(&self, identity: &str, images: Vec<Vec<u8>>) -> Result<usize> {
        self.require_admin()?;
        let identity = Identity::new(identity)?;
        if images.is_empty() {
            return Err(Error::FaceService("No images to register".into()));
        }
        let client = self.face_client()?;

        let uploaded = client.register_face(identity.as_str(), images).await?;
        if self.inner.settings.auto_train_faces
            && let Err(e) = client.train().await
        {
            warn!(identity = %identity, error = %e, "Face model retraining failed");
        }
        Ok(uploaded)
    }

    /// Ask the face service to retrain its model.
    pub async fn train_face_model(&self) -> Result<()> {
        self.require_admin()?;
        self.face_client()?.train().await?;
        Ok(())
    }

    /// Remove the template in `slot` and its mapping.
    ///
    /// Returns `false` if neither the sensor nor the store knew the slot.
    pub async fn delete_enrollment(&self, slot: SlotId) -> Result<bool> {
        self.require_admin()?;
        self.require_biometrics()?;

        let on_device = {
            let mut lease = self.inner.ownership.acquire_for_enrollment().await?;
            lease.delete(slot).await? == DeleteOutcome::Deleted
        };
        let mapped = self.inner.store.delete_mapping(slot).await?;

        info!(%slot, on_device, mapped, "Fingerprint enrollment deleted");
        Ok(on_device || mapped)
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let enrolled_fingerprints = self.inner.store.list_mappings().await?.len();
        Ok(StatusSnapshot {
            biometrics: self.biometric_status(),
            admin: lock(&self.inner.session).identity().map(str::to_owned),
            sensor_owner: self.inner.ownership.owner(),
            poller: *self.inner.poller_state.borrow(),
            poller_stats: *self.inner.poller_stats.borrow(),
            lock: self.inner.arbiter.state(),
            enrollment_active: self.enrollment_active(),
            enrolled_fingerprints,
            face_service: self.inner.face.is_some(),
            started_at: self.inner.started_at,
        })
    }

    /// Stop every background task and wait for them.
    ///
    /// The lock is released on the way out. Running enrollments are
    /// cancelled.
    pub async fn shutdown(&self) {
        info!("Shutting down access coordinator");
        self.inner.shutdown.cancel();

        let tasks = std::mem::take(&mut *lock(&self.inner.tasks));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        debug!("Access coordinator stopped");
    }
}
