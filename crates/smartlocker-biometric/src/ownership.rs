//! Sensor ownership token.
//!
//! The session sits behind a `tokio::sync::Mutex`, and a `watch` channel
//! names the logical owner allowed to use it. Enrollment flips the owner
//! first and then waits for the lock, so by the time a [`SensorLease`] is
//! handed out the poller has finished its in-flight call and will see that it
//! no longer owns the sensor. Dropping the lease hands the sensor back.

use crate::session::SensorSession;
use smartlocker_core::{Error, Result};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, watch};
use tracing::debug;

/// Logical owner of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorOwner {
    /// Nobody yet; the sensor is still being initialized or is unusable.
    #[default]
    Unassigned,
    Poller,
    Enrollment,
}

impl fmt::Display for SensorOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unassigned => write!(f, "Unassigned"),
            Self::Poller => write!(f, "Poller"),
            Self::Enrollment => write!(f, "Enrollment"),
        }
    }
}

/// Shared access point to the sensor session.
#[derive(Debug, Clone)]
pub struct SensorOwnership {
    session: Arc<Mutex<SensorSession>>,
    owner: Arc<watch::Sender<SensorOwner>>,
}

impl SensorOwnership {
    pub fn new(session: SensorSession) -> Self {
        let (owner, _) = watch::channel(SensorOwner::Unassigned);
        Self {
            session: Arc::new(Mutex::new(session)),
            owner: Arc::new(owner),
        }
    }

    /// Current owner.
    pub fn owner(&self) -> SensorOwner {
        *self.owner.borrow()
    }

    /// Receiver notified on every ownership change.
    pub fn subscribe(&self) -> watch::Receiver<SensorOwner> {
        self.owner.subscribe()
    }

    /// Replace the session, typically once background initialization is done.
    pub async fn install(&self, session: SensorSession) {
        *self.session.lock().await = session;
    }

    /// Give the sensor to the poller, unless an enrollment currently holds it.
    pub fn assign_poller(&self) {
        self.owner.send_if_modified(|owner| {
            if *owner == SensorOwner::Unassigned {
                *owner = SensorOwner::Poller;
                true
            } else {
                false
            }
        });
    }

    /// Lock the session on behalf of the poller.
    ///
    /// Returns `None` if the poller lost ownership while waiting for the lock.
    pub async fn lock_for_poller(&self) -> Option<MutexGuard<'_, SensorSession>> {
        if self.owner() != SensorOwner::Poller {
            return None;
        }
        let guard = self.session.lock().await;
        (self.owner() == SensorOwner::Poller).then_some(guard)
    }

    /// Lock the session for a read-only look (connectivity, capacity).
    ///
    /// Waits for any in-flight device call or lease.
    pub async fn inspect(&self) -> MutexGuard<'_, SensorSession> {
        self.session.lock().await
    }

    /// Take exclusive ownership for a multi-step operation.
    ///
    /// Suspends the poller, then waits until its in-flight call has
    /// completed. Dropping the returned future before it resolves hands the
    /// sensor straight back.
    ///
    /// # Errors
    ///
    /// - `Error::EnrollmentInProgress` if another lease is outstanding
    /// - `Error::SensorUnavailable` if the sensor was never handed to the poller
    pub async fn acquire_for_enrollment(&self) -> Result<SensorLease> {
        let mut refusal = None;
        self.owner.send_if_modified(|owner| match *owner {
            SensorOwner::Poller => {
                *owner = SensorOwner::Enrollment;
                true
            }
            SensorOwner::Enrollment => {
                refusal = Some(Error::EnrollmentInProgress);
                false
            }
            SensorOwner::Unassigned => {
                refusal = Some(Error::SensorUnavailable);
                false
            }
        });
        if let Some(e) = refusal {
            return Err(e);
        }

        // From here on every exit path, including cancellation while waiting
        // for the lock, gives the sensor back to the poller.
        let claim = OwnerClaim {
            owner: Arc::clone(&self.owner),
            restore: SensorOwner::Poller,
        };
        debug!("Sensor ownership requested for enrollment");

        let mut guard = Arc::clone(&self.session).lock_owned().await;
        guard.stand_down();
        debug!("Sensor ownership transferred to enrollment");

        Ok(SensorLease {
            guard,
            _claim: claim,
        })
    }
}

/// Pending or granted enrollment ownership. Dropping it hands the sensor back.
#[derive(Debug)]
struct OwnerClaim {
    owner: Arc<watch::Sender<SensorOwner>>,
    restore: SensorOwner,
}

impl Drop for OwnerClaim {
    fn drop(&mut self) {
        self.owner.send_replace(self.restore);
        debug!(owner = %self.restore, "Sensor ownership released");
    }
}

/// Exclusive, scoped ownership of the sensor session.
///
/// Dereferences to [`SensorSession`]. Dropping the lease returns ownership to
/// whoever held it before.
#[derive(Debug)]
pub struct SensorLease {
    guard: OwnedMutexGuard<SensorSession>,
    // Declared after `guard`: the lock is released before the owner changes.
    _claim: OwnerClaim,
}

impl Deref for SensorLease {
    type Target = SensorSession;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SensorLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SensorLease {
    fn drop(&mut self) {
        // Leave the device in a pollable state whatever the exit path was.
        self.guard.abort_enroll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SensorMode;
    use smartlocker_core::SlotId;
    use smartlocker_hardware::{AnyFingerprintSensor, mock::MockFingerprintSensor};
    use std::time::Duration;

    async fn ownership() -> SensorOwnership {
        let (sensor, _handle) = MockFingerprintSensor::new();
        let session = SensorSession::initialize(AnyFingerprintSensor::Mock(sensor)).await;
        let ownership = SensorOwnership::new(session);
        ownership.assign_poller();
        ownership
    }

    #[tokio::test]
    async fn test_assign_poller_from_unassigned() {
        let ownership = SensorOwnership::new(SensorSession::unavailable("test"));
        assert_eq!(ownership.owner(), SensorOwner::Unassigned);

        ownership.assign_poller();
        assert_eq!(ownership.owner(), SensorOwner::Poller);
    }

    #[tokio::test]
    async fn test_lease_suspends_and_restores_poller() {
        let ownership = ownership().await;

        let lease = ownership.acquire_for_enrollment().await.unwrap();
        assert_eq!(ownership.owner(), SensorOwner::Enrollment);
        assert!(ownership.lock_for_poller().await.is_none());

        drop(lease);
        assert_eq!(ownership.owner(), SensorOwner::Poller);
        assert!(ownership.lock_for_poller().await.is_some());
    }

    #[tokio::test]
    async fn test_second_lease_is_refused() {
        let ownership = ownership().await;

        let _lease = ownership.acquire_for_enrollment().await.unwrap();
        assert!(matches!(
            ownership.acquire_for_enrollment().await,
            Err(Error::EnrollmentInProgress)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_waits_for_in_flight_poll() {
        let ownership = ownership().await;

        let guard = ownership.lock_for_poller().await.unwrap();
        let contender = ownership.clone();
        let acquire = tokio::spawn(async move { contender.acquire_for_enrollment().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ownership.owner(), SensorOwner::Enrollment);
        assert!(!acquire.is_finished());

        drop(guard);
        let lease = acquire.await.unwrap().unwrap();
        assert_eq!(lease.connectivity(), crate::session::Connectivity::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_acquire_restores_poller() {
        let ownership = ownership().await;

        let guard = ownership.lock_for_poller().await.unwrap();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), ownership.acquire_for_enrollment())
                .await;
        assert!(abandoned.is_err());
        assert_eq!(ownership.owner(), SensorOwner::Poller);

        drop(guard);
        assert!(ownership.lock_for_poller().await.is_some());
        assert!(ownership.acquire_for_enrollment().await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_before_poller_assigned_is_refused() {
        let ownership = SensorOwnership::new(SensorSession::unavailable("initializing"));

        assert!(matches!(
            ownership.acquire_for_enrollment().await,
            Err(Error::SensorUnavailable)
        ));
        assert_eq!(ownership.owner(), SensorOwner::Unassigned);

        ownership.assign_poller();
        assert_eq!(ownership.owner(), SensorOwner::Poller);
    }

    #[tokio::test]
    async fn test_lease_marks_polling_sensor_idle() {
        let ownership = ownership().await;

        {
            let mut session = ownership.lock_for_poller().await.unwrap();
            assert_eq!(session.capture_and_match().await.unwrap(), None);
            assert_eq!(session.mode(), SensorMode::Polling);
        }

        let lease = ownership.acquire_for_enrollment().await.unwrap();
        assert_eq!(lease.mode(), SensorMode::Idle);
    }

    #[tokio::test]
    async fn test_dropping_lease_aborts_enrollment() {
        let ownership = ownership().await;

        let mut lease = ownership.acquire_for_enrollment().await.unwrap();
        lease.begin_enroll(SlotId::new(1)).unwrap();
        drop(lease);

        let session = ownership.inspect().await;
        assert_eq!(session.mode(), SensorMode::Idle);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let ownership = ownership().await;
        let mut rx = ownership.subscribe();

        let lease = ownership.acquire_for_enrollment().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SensorOwner::Enrollment);

        drop(lease);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SensorOwner::Poller);
    }
}
